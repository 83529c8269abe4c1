use std::ffi::CString;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{OraRsError, Result};
use crate::native::{
    ConnHandle, ContextHandle, ExecMode, NativeClient, NativeData, NativeTimestamp, NativeTypeNum,
    QueryValue, StmtHandle,
};
use crate::types::{ColumnOffsets, Row, Value};

/// Native handles owned by an open connection. They are always opened and
/// released together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Handles {
    pub connection: ConnHandle,
    pub context: ContextHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Prepared,
    Bound,
    Executed,
    Fetching,
    Released,
}

/// One prepared statement, used for a single execute and fetch sequence.
///
/// The native handle is released exactly once: when fetching runs out of
/// rows, or on drop if the sequence stopped early.
pub(crate) struct Statement<'c> {
    client: &'c dyn NativeClient,
    context: ContextHandle,
    handle: Option<StmtHandle>,
    state: State,
}

impl<'c> Statement<'c> {
    pub fn prepare(client: &'c dyn NativeClient, handles: Handles, sql: &str) -> Result<Self> {
        match client.prepare_statement(handles.connection, false, sql.as_bytes(), b"") {
            Ok(handle) => {
                debug!("statement prepared");
                Ok(Self {
                    client,
                    context: handles.context,
                    handle: Some(handle),
                    state: State::Prepared,
                })
            }
            Err(_) => {
                let err = OraRsError::get_last(client, Some(handles.context));
                debug!(error = %err, "failed to prepare statement");
                Err(err)
            }
        }
    }

    /// Binds `values` to placeholders `:1..:n`. Stops at the first failure;
    /// positions bound before it stay bound.
    pub fn bind(&mut self, values: &[Value]) -> Result<()> {
        self.expect_state(State::Prepared, "bind")?;
        let handle = self.handle()?;
        for (i, value) in values.iter().enumerate() {
            let position = u32::try_from(i + 1)
                .map_err(|_| OraRsError::Error(format!("too many binds: {}", values.len())))?;
            let (native_type, data) = native_bind(value)?;
            trace!(position, %native_type, "binding value");
            self.client
                .bind_value_by_pos(handle, position, native_type, &data)
                .map_err(|_| self.last_error())?;
        }
        self.state = State::Bound;
        Ok(())
    }

    pub fn execute(&mut self) -> Result<()> {
        self.expect_state(State::Bound, "execute")?;
        let handle = self.handle()?;
        self.client
            .execute(handle, ExecMode::Default)
            .map_err(|_| self.last_error())?;
        self.state = State::Executed;
        Ok(())
    }

    /// Reads the column names once. Every row fetched afterwards shares the
    /// returned offsets.
    pub fn columns(&mut self) -> Result<Arc<ColumnOffsets>> {
        self.expect_state(State::Executed, "read columns of")?;
        let handle = self.handle()?;
        let count = self
            .client
            .num_query_columns(handle)
            .map_err(|_| self.last_error())?;
        debug!(count, "query columns");

        let mut names = Vec::with_capacity(count as usize);
        for position in 1..=count {
            let info = self
                .client
                .query_info(handle, position)
                .map_err(|_| self.last_error())?;
            names.push(info.name);
        }

        self.state = State::Fetching;
        Ok(Arc::new(ColumnOffsets::new(names)))
    }

    /// Fetches the next row. Returns `None` once the cursor is exhausted, at
    /// which point the statement handle has been released.
    pub fn next_row(&mut self, offsets: &Arc<ColumnOffsets>) -> Result<Option<Row>> {
        if self.state == State::Released {
            return Ok(None);
        }
        self.expect_state(State::Fetching, "fetch from")?;
        let handle = self.handle()?;

        let found = self.client.fetch(handle).map_err(|_| self.last_error())?;
        if found.is_none() {
            self.release();
            return Ok(None);
        }

        let mut values = Vec::with_capacity(offsets.len());
        for position in 1..=offsets.len() as u32 {
            let value = self
                .client
                .query_value(handle, position)
                .map_err(|_| self.last_error())?;
            values.push(read_value(value)?);
        }
        Ok(Some(Row::new(Arc::clone(offsets), values)))
    }

    fn handle(&self) -> Result<StmtHandle> {
        self.handle
            .ok_or_else(|| OraRsError::Error("statement already released".to_string()))
    }

    fn expect_state(&self, expected: State, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(OraRsError::Error(format!(
                "cannot {} a statement in state {:?}",
                action, self.state
            )))
        }
    }

    fn last_error(&self) -> OraRsError {
        OraRsError::get_last(self.client, Some(self.context))
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            if self.client.release_statement(handle).is_err() {
                debug!(error = %self.last_error(), "failed to release statement");
            }
            trace!("statement released");
        }
        self.state = State::Released;
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Native tag and payload for a bound value.
fn native_bind(value: &Value) -> Result<(NativeTypeNum, NativeData)> {
    let bind = match value {
        Value::Integer(integer) => (NativeTypeNum::Int64, NativeData::Int64(*integer)),
        Value::Float(float) => (NativeTypeNum::Double, NativeData::Double(f64::from(*float))),
        Value::Double(double) => (NativeTypeNum::Double, NativeData::Double(*double)),
        Value::Text(text) => {
            let text = CString::new(text.as_str()).map_err(|_| {
                OraRsError::Error("text bind contains an interior NUL byte".to_string())
            })?;
            (NativeTypeNum::Bytes, NativeData::Bytes(text.into_bytes()))
        }
        Value::Timestamp(stamp) => {
            let native = NativeTimestamp::try_from(*stamp).map_err(|_| {
                OraRsError::Error(format!("timestamp out of native range: {}", stamp))
            })?;
            (NativeTypeNum::Timestamp, NativeData::Timestamp(native))
        }
        Value::Blob(bytes) => (NativeTypeNum::Lob, NativeData::Lob(bytes.clone())),
        Value::Raw(bytes) => (NativeTypeNum::Bytes, NativeData::Bytes(bytes.clone())),
        Value::Null => (NativeTypeNum::Null, NativeData::Null),
    };
    Ok(bind)
}

/// Converts a native column value into a [`Value`].
fn read_value(value: QueryValue) -> Result<Value> {
    let native_type = NativeTypeNum::from_raw(value.native_type).ok_or_else(|| {
        OraRsError::Error(format!("Unexpected column type: {}", value.native_type))
    })?;

    let converted = match (native_type, value.data) {
        (_, NativeData::Null) | (NativeTypeNum::Null, _) => Value::Null,
        (NativeTypeNum::Int64, NativeData::Int64(integer)) => Value::Integer(integer),
        (NativeTypeNum::Float, NativeData::Float(float)) => Value::Float(float),
        (NativeTypeNum::Double, NativeData::Double(double)) => Value::Double(double),
        (NativeTypeNum::Bytes, NativeData::Bytes(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(e) => Value::Raw(e.into_bytes()),
        },
        (NativeTypeNum::Timestamp, NativeData::Timestamp(stamp)) => {
            Value::Timestamp(stamp.to_utc().ok_or_else(|| {
                OraRsError::Error(format!("timestamp out of range: {:?}", stamp))
            })?)
        }
        (NativeTypeNum::Lob, NativeData::Lob(bytes)) => Value::Blob(bytes),
        (native_type, data) => {
            return Err(OraRsError::Error(format!(
                "column of type {} holds a {:?} payload",
                native_type,
                data.native_type()
            )))
        }
    };
    Ok(converted)
}
