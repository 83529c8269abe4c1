use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn, Span};

use crate::config::ConnectOptions;
use crate::error::{OraRsError, Result};
use crate::native::{CloseMode, ContextHandle, LibraryVersion, NativeClient};
use crate::query::Query;
use crate::statement::{Handles, Statement};
use crate::traits::{ConnectionFuture, OnRow, OracleDatabase};
use crate::worker::WorkerPool;

/// An open connection to an Oracle database.
///
/// Every native call runs on the worker pool. Row callbacks and handle state
/// changes run on the event loop, which should be a single-threaded runtime
/// so that callbacks execute in the order rows were fetched.
///
/// Queries on one connection run one at a time; a query issued while
/// another is in flight waits for it. A connection must be closed before it
/// is dropped.
///
/// # Example
/// ```ignore
/// let connection = Connection::connect_default(client, ConnectOptions::from_env()?).await?;
/// let rows = connection
///     .query_all(query!("SELECT " {1i64} " AS value FROM dual"))
///     .await?;
/// assert_eq!(rows[0].column("value").and_then(Value::integer), Some(1));
/// connection.close().await?;
/// ```
pub struct Connection {
    client: Arc<dyn NativeClient>,
    handles: Mutex<Option<Handles>>,
    in_flight: tokio::sync::Mutex<()>,
    pool: WorkerPool,
    event_loop: Handle,
    span: Span,
}

impl Connection {
    /// Opens a connection.
    ///
    /// Creates the native context, first with the configured client library
    /// directory and, if that fails, once more without it. Then creates the
    /// native connection. Both steps run on `pool`.
    pub async fn connect(
        client: Arc<dyn NativeClient>,
        options: ConnectOptions,
        pool: WorkerPool,
        span: Span,
        event_loop: Handle,
    ) -> Result<Self> {
        options.validate()?;

        let native = Arc::clone(&client);
        let worker_span = span.clone();
        let handles = pool
            .submit(move || {
                let _entered = worker_span.enter();
                open(&*native, &options)
            })
            .await??;
        debug!(parent: &span, "connected to oracle db");

        Ok(Self {
            client,
            handles: Mutex::new(Some(handles)),
            in_flight: tokio::sync::Mutex::new(()),
            pool,
            event_loop,
            span,
        })
    }

    /// Opens a connection using the current runtime as both event loop and
    /// worker pool, logging under an `oracle` span.
    pub async fn connect_default(
        client: Arc<dyn NativeClient>,
        options: ConnectOptions,
    ) -> Result<Self> {
        let span = tracing::info_span!("oracle", connection = %options.connection_string);
        Self::connect(client, options, WorkerPool::current(), span, Handle::current()).await
    }

    /// Version of the native client library in use.
    pub fn library_version(&self) -> LibraryVersion {
        self.client.library_version()
    }

    pub fn is_closed(&self) -> bool {
        self.current_handles().is_none()
    }

    /// The last error the native layer recorded on this connection's
    /// context, or `NoContext` once the connection is closed.
    pub fn last_error(&self) -> OraRsError {
        OraRsError::get_last(
            &*self.client,
            self.current_handles().map(|handles| handles.context),
        )
    }

    fn lock_handles(&self) -> MutexGuard<'_, Option<Handles>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_handles(&self) -> Option<Handles> {
        *self.lock_handles()
    }

    fn live_handles(&self) -> Result<Handles> {
        self.current_handles().ok_or_else(OraRsError::no_handle)
    }
}

#[async_trait]
impl OracleDatabase for Connection {
    fn span(&self) -> &Span {
        &self.span
    }

    fn event_loop(&self) -> &Handle {
        &self.event_loop
    }

    async fn query_with_span(&self, query: Query, span: &Span, on_row: OnRow) -> Result<()> {
        let _serial = self.in_flight.lock().await;
        let handles = self.live_handles()?;
        debug!(parent: span, sql = %query.sql(), binds = ?query.bindings().values(), "query");

        let client = Arc::clone(&self.client);
        let event_loop = self.event_loop.clone();
        let worker_span = span.clone();
        let (callbacks, fetched) = self
            .pool
            .submit(move || {
                let _entered = worker_span.enter();
                let mut callbacks = Vec::new();
                let fetched =
                    fetch_rows(&*client, handles, &query, &event_loop, &on_row, &mut callbacks);
                (callbacks, fetched)
            })
            .await?;

        // Callbacks already submitted keep running even when fetching failed.
        if let Err(err) = fetched {
            error!(parent: span, error = %err, "query failed");
            return Err(err);
        }

        for callback in callbacks {
            callback
                .await
                .map_err(|e| OraRsError::Error(format!("row callback task failed: {}", e)))??;
        }
        Ok(())
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c Connection) -> ConnectionFuture<'c, T> + Send,
    {
        work(self).await
    }

    async fn close(&self) -> Result<()> {
        let _serial = self.in_flight.lock().await;
        let Some(handles) = self.current_handles() else {
            debug!(parent: &self.span, "connection already closed");
            return Ok(());
        };

        let client = Arc::clone(&self.client);
        let closed = self
            .pool
            .submit(move || {
                let closed = client
                    .close_connection(handles.connection, CloseMode::Default, b"")
                    .map_err(|_| OraRsError::get_last(&*client, Some(handles.context)));
                client.destroy_context(handles.context);
                closed
            })
            .await;

        // Both handles are gone on the native side; clear them together.
        *self.lock_handles() = None;

        if let Ok(Err(err)) | Err(err) = &closed {
            warn!(parent: &self.span, error = %err, "error while closing connection");
        }
        closed??;
        debug!(parent: &self.span, "connection closed");
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.is_closed(),
                "Connection was not closed before being dropped"
            );
        }
    }
}

fn open(client: &dyn NativeClient, options: &ConnectOptions) -> Result<Handles> {
    let context = create_context(client, options)?;

    match client.create_connection(
        context,
        options.username.as_bytes(),
        options.password.as_bytes(),
        options.connection_string.as_bytes(),
        &options.conn_create_params(),
    ) {
        Ok(connection) => Ok(Handles {
            connection,
            context,
        }),
        Err(_) => {
            let err = OraRsError::get_last(client, Some(context));
            error!(error = %err, "failed to connect to db");
            client.destroy_context(context);
            Err(err)
        }
    }
}

fn create_context(client: &dyn NativeClient, options: &ConnectOptions) -> Result<ContextHandle> {
    if options.client_lib_dir.is_some() {
        match client.create_context(&options.context_params(true)) {
            Ok(context) => return Ok(context),
            Err(info) => warn!(
                code = info.code,
                message = %info.message,
                "failed to create context with client library directory, retrying without it"
            ),
        }
    }

    client
        .create_context(&options.context_params(false))
        .map_err(|info| {
            error!(code = info.code, message = %info.message, "failed to create context");
            OraRsError::from(info)
        })
}

/// Runs the statement on the calling (worker) thread and schedules `on_row`
/// on the event loop for each row, in fetch order.
fn fetch_rows(
    client: &dyn NativeClient,
    handles: Handles,
    query: &Query,
    event_loop: &Handle,
    on_row: &OnRow,
    callbacks: &mut Vec<JoinHandle<Result<()>>>,
) -> Result<()> {
    let mut statement = Statement::prepare(client, handles, query.sql())?;
    trace!("adding binds");
    statement.bind(query.bindings().values())?;
    trace!("executing statement");
    statement.execute()?;
    trace!("fetching columns");
    let offsets = statement.columns()?;

    while let Some(row) = statement.next_row(&offsets)? {
        let on_row = Arc::clone(on_row);
        callbacks.push(event_loop.spawn(async move { on_row(row) }));
    }
    trace!(rows = callbacks.len(), "all rows fetched");
    Ok(())
}
