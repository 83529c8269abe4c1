use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::Span;

use crate::connection::Connection;
use crate::error::Result;
use crate::query::Query;
use crate::types::{Row, Value};

/// Callback invoked on the event loop for every fetched row.
pub type OnRow = Arc<dyn Fn(Row) -> Result<()> + Send + Sync>;

/// Future returned by a [`OracleDatabase::with_connection`] closure.
pub type ConnectionFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Something queries can be run against.
///
/// Implementors provide the span-aware query primitive and `close`; the
/// row-collecting and raw-SQL variants are built on top of it.
#[async_trait]
pub trait OracleDatabase: Send + Sync {
    /// Span that queries are logged under unless one is passed explicitly.
    fn span(&self) -> &Span;

    /// The event loop row callbacks are scheduled on.
    fn event_loop(&self) -> &Handle;

    /// Runs `query`, invoking `on_row` on the event loop for every row.
    async fn query_with_span(&self, query: Query, span: &Span, on_row: OnRow) -> Result<()>;

    /// Runs `work` against the connection backing this database.
    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c Connection) -> ConnectionFuture<'c, T> + Send;

    /// Releases the native resources.
    async fn close(&self) -> Result<()>;

    async fn query<F>(&self, query: Query, on_row: F) -> Result<()>
    where
        F: Fn(Row) -> Result<()> + Send + Sync + 'static,
    {
        let span = self.span().clone();
        self.query_with_span(query, &span, Arc::new(on_row)).await
    }

    /// Runs `query` and collects every row in fetch order.
    async fn query_all(&self, query: Query) -> Result<Vec<Row>> {
        let rows = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rows);
        self.query(query, move |row| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(row);
            Ok(())
        })
        .await?;

        let mut rows = rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(std::mem::take(&mut *rows))
    }

    /// Runs raw SQL whose placeholders are filled from `binds` in order.
    async fn query_sql(&self, sql: &str, binds: Vec<Value>) -> Result<Vec<Row>> {
        self.query_all(Query::with_bindings(sql, binds)).await
    }

    async fn query_sql_each<F>(&self, sql: &str, binds: Vec<Value>, on_row: F) -> Result<()>
    where
        F: Fn(Row) -> Result<()> + Send + Sync + 'static,
    {
        self.query(Query::with_bindings(sql, binds), on_row).await
    }

    /// A view of this database that logs under `span` instead.
    fn logging(&self, span: Span) -> Logged<'_, Self>
    where
        Self: Sized,
    {
        Logged {
            database: self,
            span,
        }
    }
}

/// Forwards every operation to the wrapped database, substituting its span.
pub struct Logged<'a, D> {
    database: &'a D,
    span: Span,
}

#[async_trait]
impl<'a, D: OracleDatabase> OracleDatabase for Logged<'a, D> {
    fn span(&self) -> &Span {
        &self.span
    }

    fn event_loop(&self) -> &Handle {
        self.database.event_loop()
    }

    async fn query_with_span(&self, query: Query, span: &Span, on_row: OnRow) -> Result<()> {
        self.database.query_with_span(query, span, on_row).await
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c Connection) -> ConnectionFuture<'c, T> + Send,
    {
        self.database.with_connection(work).await
    }

    async fn close(&self) -> Result<()> {
        self.database.close().await
    }
}
