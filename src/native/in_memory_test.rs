use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroU64;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use super::{
    CloseMode, ConnCreateParams, ConnHandle, ContextHandle, ContextParams, ErrorInfo, ExecMode,
    LibraryVersion, NativeClient, NativeData, NativeFailure, NativeResult, NativeTypeNum, QueryInfo, QueryValue,
    StmtHandle,
};

/// Native verbs, used to record calls and to script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeCall {
    CreateContext,
    DestroyContext,
    CreateConnection,
    CloseConnection,
    Prepare,
    Bind,
    Execute,
    QueryColumns,
    QueryInfo,
    QueryValue,
    Fetch,
    Release,
}

/// A value bound to a recorded statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBind {
    pub position: u32,
    pub native_type: NativeTypeNum,
    pub data: NativeData,
}

/// A prepared statement recorded for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub binds: Vec<RecordedBind>,
}

/// Column names and rows returned for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<QueryValue>>,
}

/// Builder for creating result sets easily.
#[derive(Debug, Default)]
pub struct InMemoryResultSetBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<QueryValue>>,
}

impl InMemoryResultSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the column names for the result set.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a row; each value is tagged with its natural native type.
    pub fn row(mut self, values: Vec<NativeData>) -> Self {
        self.rows
            .push(values.into_iter().map(QueryValue::from).collect());
        self
    }

    /// Add a row with explicit native type tags.
    pub fn raw_row(mut self, values: Vec<QueryValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn build(self) -> InMemoryResultSet {
        InMemoryResultSet {
            columns: self.columns,
            rows: self.rows,
        }
    }
}

struct ScriptedFailure {
    call: NativeCall,
    skip: usize,
    error: ErrorInfo,
}

struct OpenStatement {
    context: ContextHandle,
    result: InMemoryResultSet,
    cursor: Option<usize>,
}

#[derive(Default)]
struct State {
    result_sets: VecDeque<InMemoryResultSet>,
    failures: Vec<ScriptedFailure>,
    calls: Vec<(NativeCall, ThreadId)>,
    statements: Vec<RecordedStatement>,
    context_requests: Vec<ContextParams>,
    credentials: Vec<(Vec<u8>, Vec<u8>, Vec<u8>, ConnCreateParams)>,
    contexts: HashSet<ContextHandle>,
    connections: HashMap<ConnHandle, ContextHandle>,
    open_statements: HashMap<StmtHandle, (usize, OpenStatement)>,
    released: Vec<StmtHandle>,
    last_errors: HashMap<ContextHandle, ErrorInfo>,
    next_handle: u64,
}

impl State {
    fn allocate(&mut self) -> NonZeroU64 {
        self.next_handle += 1;
        NonZeroU64::new(self.next_handle).unwrap_or(NonZeroU64::MIN)
    }

    fn record(&mut self, call: NativeCall) {
        self.calls.push((call, thread::current().id()));
    }

    /// Records the call and pops a scripted failure for it, if one is due.
    fn enter(&mut self, call: NativeCall) -> Option<ErrorInfo> {
        self.record(call);
        let index = self.failures.iter().position(|f| f.call == call)?;
        if self.failures[index].skip > 0 {
            self.failures[index].skip -= 1;
            return None;
        }
        Some(self.failures.remove(index).error)
    }

    fn fail<T>(&mut self, context: ContextHandle, error: ErrorInfo) -> NativeResult<T> {
        self.last_errors.insert(context, error);
        Err(NativeFailure)
    }

    fn statement_context(&self, stmt: StmtHandle) -> Option<ContextHandle> {
        self.open_statements
            .get(&stmt)
            .map(|(_, open)| open.context)
    }
}

fn invalid_handle(kind: &str) -> ErrorInfo {
    ErrorInfo::new(1002, format!("DPI-1002: invalid {} handle", kind))
}

/// An in-memory native client for testing.
///
/// Returns queued result sets in FIFO order, one per prepared statement,
/// records every call with the thread it ran on, and can be scripted to fail
/// any verb that reports errors.
///
/// # Example
/// ```
/// use orars::native::{InMemoryNativeClient, InMemoryResultSetBuilder, NativeData};
///
/// let client = InMemoryNativeClient::new().with_result_set(
///     InMemoryResultSetBuilder::new()
///         .columns(&["ID", "NAME"])
///         .row(vec![NativeData::Int64(1), NativeData::Bytes(b"Alice".to_vec())])
///         .build(),
/// );
/// assert_eq!(client.open_connections(), 0);
/// ```
pub struct InMemoryNativeClient {
    state: Mutex<State>,
}

impl InMemoryNativeClient {
    /// Create a new in-memory client with no pre-configured result sets.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a result set to be returned by the next prepared statement.
    pub fn with_result_set(self, result: InMemoryResultSet) -> Self {
        self.state().result_sets.push_back(result);
        self
    }

    /// Make the next call of `call` fail with `error`.
    ///
    /// `DestroyContext` cannot fail; failures scripted for it never fire.
    pub fn with_failure(self, call: NativeCall, error: ErrorInfo) -> Self {
        self.with_failure_after(call, 0, error)
    }

    /// Let `skip` calls of `call` succeed, then fail the next one.
    pub fn with_failure_after(self, call: NativeCall, skip: usize, error: ErrorInfo) -> Self {
        self.state().failures.push(ScriptedFailure { call, skip, error });
        self
    }

    /// Every native call made so far, with the thread it ran on.
    pub fn calls(&self) -> Vec<(NativeCall, ThreadId)> {
        self.state().calls.clone()
    }

    /// Number of times `call` was made.
    pub fn call_count(&self, call: NativeCall) -> usize {
        self.state().calls.iter().filter(|(c, _)| *c == call).count()
    }

    /// All prepared statements with the values bound to them.
    pub fn recorded_statements(&self) -> Vec<RecordedStatement> {
        self.state().statements.clone()
    }

    /// Get the last prepared statement, if any.
    pub fn last_statement(&self) -> Option<RecordedStatement> {
        self.state().statements.last().cloned()
    }

    /// Parameters of every context creation attempt.
    pub fn context_requests(&self) -> Vec<ContextParams> {
        self.state().context_requests.clone()
    }

    /// Raw username, password and connect string of every connection attempt.
    pub fn connection_requests(&self) -> Vec<(Vec<u8>, Vec<u8>, Vec<u8>, ConnCreateParams)> {
        self.state().credentials.clone()
    }

    pub fn open_contexts(&self) -> usize {
        self.state().contexts.len()
    }

    pub fn open_connections(&self) -> usize {
        self.state().connections.len()
    }

    pub fn open_statements(&self) -> usize {
        self.state().open_statements.len()
    }

    /// Statement handles in the order they were released.
    pub fn released_statements(&self) -> Vec<StmtHandle> {
        self.state().released.clone()
    }
}

impl Default for InMemoryNativeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeClient for InMemoryNativeClient {
    fn library_version(&self) -> LibraryVersion {
        LibraryVersion {
            major: 4,
            minor: 6,
            patch: 1,
        }
    }

    fn create_context(&self, params: &ContextParams) -> Result<ContextHandle, ErrorInfo> {
        let mut state = self.state();
        state.context_requests.push(params.clone());
        if let Some(error) = state.enter(NativeCall::CreateContext) {
            return Err(error);
        }
        let context = ContextHandle::new(state.allocate());
        state.contexts.insert(context);
        Ok(context)
    }

    fn destroy_context(&self, context: ContextHandle) {
        let mut state = self.state();
        state.record(NativeCall::DestroyContext);
        state.contexts.remove(&context);
        state.last_errors.remove(&context);
    }

    fn get_error(&self, context: ContextHandle) -> ErrorInfo {
        self.state()
            .last_errors
            .get(&context)
            .cloned()
            .unwrap_or_else(|| ErrorInfo::new(0, ""))
    }

    fn create_connection(
        &self,
        context: ContextHandle,
        username: &[u8],
        password: &[u8],
        connect_string: &[u8],
        params: &ConnCreateParams,
    ) -> NativeResult<ConnHandle> {
        let mut state = self.state();
        state.credentials.push((
            username.to_vec(),
            password.to_vec(),
            connect_string.to_vec(),
            *params,
        ));
        if let Some(error) = state.enter(NativeCall::CreateConnection) {
            return state.fail(context, error);
        }
        if !state.contexts.contains(&context) {
            return state.fail(context, invalid_handle("context"));
        }
        let conn = ConnHandle::new(state.allocate());
        state.connections.insert(conn, context);
        Ok(conn)
    }

    fn close_connection(&self, conn: ConnHandle, _mode: CloseMode, _tag: &[u8]) -> NativeResult<()> {
        let mut state = self.state();
        let failure = state.enter(NativeCall::CloseConnection);
        let Some(context) = state.connections.remove(&conn) else {
            return Err(NativeFailure);
        };
        match failure {
            Some(error) => state.fail(context, error),
            None => Ok(()),
        }
    }

    fn prepare_statement(
        &self,
        conn: ConnHandle,
        _scrollable: bool,
        sql: &[u8],
        _tag: &[u8],
    ) -> NativeResult<StmtHandle> {
        let mut state = self.state();
        let failure = state.enter(NativeCall::Prepare);
        let Some(context) = state.connections.get(&conn).copied() else {
            return Err(NativeFailure);
        };
        if let Some(error) = failure {
            return state.fail(context, error);
        }

        state.statements.push(RecordedStatement {
            sql: String::from_utf8_lossy(sql).into_owned(),
            binds: Vec::new(),
        });
        let recorded = state.statements.len() - 1;
        let result = state.result_sets.pop_front().unwrap_or_default();
        let stmt = StmtHandle::new(state.allocate());
        state.open_statements.insert(
            stmt,
            (
                recorded,
                OpenStatement {
                    context,
                    result,
                    cursor: None,
                },
            ),
        );
        Ok(stmt)
    }

    fn bind_value_by_pos(
        &self,
        stmt: StmtHandle,
        pos: u32,
        native_type: NativeTypeNum,
        data: &NativeData,
    ) -> NativeResult<()> {
        let mut state = self.state();
        let failure = state.enter(NativeCall::Bind);
        let Some(context) = state.statement_context(stmt) else {
            return Err(NativeFailure);
        };
        if let Some(error) = failure {
            return state.fail(context, error);
        }
        let Some(recorded) = state.open_statements.get(&stmt).map(|(recorded, _)| *recorded) else {
            return Err(NativeFailure);
        };
        state.statements[recorded].binds.push(RecordedBind {
            position: pos,
            native_type,
            data: data.clone(),
        });
        Ok(())
    }

    fn execute(&self, stmt: StmtHandle, _mode: ExecMode) -> NativeResult<u32> {
        let mut state = self.state();
        let failure = state.enter(NativeCall::Execute);
        let Some(context) = state.statement_context(stmt) else {
            return Err(NativeFailure);
        };
        if let Some(error) = failure {
            return state.fail(context, error);
        }
        let columns = state
            .open_statements
            .get(&stmt)
            .map(|(_, open)| open.result.columns.len())
            .unwrap_or_default();
        Ok(columns as u32)
    }

    fn num_query_columns(&self, stmt: StmtHandle) -> NativeResult<u32> {
        let mut state = self.state();
        let failure = state.enter(NativeCall::QueryColumns);
        let Some(context) = state.statement_context(stmt) else {
            return Err(NativeFailure);
        };
        if let Some(error) = failure {
            return state.fail(context, error);
        }
        state
            .open_statements
            .get(&stmt)
            .map(|(_, open)| open.result.columns.len() as u32)
            .ok_or(NativeFailure)
    }

    fn query_info(&self, stmt: StmtHandle, pos: u32) -> NativeResult<QueryInfo> {
        let mut state = self.state();
        let failure = state.enter(NativeCall::QueryInfo);
        let Some(context) = state.statement_context(stmt) else {
            return Err(NativeFailure);
        };
        if let Some(error) = failure {
            return state.fail(context, error);
        }
        let name = state.open_statements.get(&stmt).and_then(|(_, open)| {
            open.result.columns.get((pos as usize).checked_sub(1)?).cloned()
        });
        match name {
            Some(name) => Ok(QueryInfo { name }),
            None => state.fail(context, ErrorInfo::new(1028, "DPI-1028: query position is invalid")),
        }
    }

    fn query_value(&self, stmt: StmtHandle, pos: u32) -> NativeResult<QueryValue> {
        let mut state = self.state();
        let failure = state.enter(NativeCall::QueryValue);
        let Some(context) = state.statement_context(stmt) else {
            return Err(NativeFailure);
        };
        if let Some(error) = failure {
            return state.fail(context, error);
        }
        let value = state.open_statements.get(&stmt).and_then(|(_, open)| {
            let row = open.result.rows.get(open.cursor?)?;
            row.get((pos as usize).checked_sub(1)?).cloned()
        });
        match value {
            Some(value) => Ok(value),
            None => state.fail(context, ErrorInfo::new(1028, "DPI-1028: query position is invalid")),
        }
    }

    fn fetch(&self, stmt: StmtHandle) -> NativeResult<Option<u32>> {
        let mut state = self.state();
        let failure = state.enter(NativeCall::Fetch);
        let Some(context) = state.statement_context(stmt) else {
            return Err(NativeFailure);
        };
        if let Some(error) = failure {
            return state.fail(context, error);
        }
        let Some((_, open)) = state.open_statements.get_mut(&stmt) else {
            return Err(NativeFailure);
        };
        let next = open.cursor.map_or(0, |cursor| cursor + 1);
        open.cursor = Some(next);
        if next < open.result.rows.len() {
            Ok(Some(next as u32))
        } else {
            Ok(None)
        }
    }

    fn release_statement(&self, stmt: StmtHandle) -> NativeResult<()> {
        let mut state = self.state();
        let failure = state.enter(NativeCall::Release);
        let Some(context) = state.statement_context(stmt) else {
            return Err(NativeFailure);
        };
        // A failed release leaves the statement open.
        if let Some(error) = failure {
            return state.fail(context, error);
        }
        state.open_statements.remove(&stmt);
        state.released.push(stmt);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(client: &InMemoryNativeClient) -> (ContextHandle, ConnHandle) {
        let context = client.create_context(&ContextParams::default()).unwrap();
        let conn = client
            .create_connection(context, b"u", b"p", b"db", &ConnCreateParams::default())
            .unwrap();
        (context, conn)
    }

    #[test]
    fn test_result_sets_are_returned_in_order() {
        let client = InMemoryNativeClient::new().with_result_set(
            InMemoryResultSetBuilder::new()
                .columns(&["A"])
                .row(vec![NativeData::Int64(1)])
                .build(),
        );
        let (_, conn) = connect(&client);

        let stmt = client.prepare_statement(conn, false, b"SELECT 1 A FROM dual", b"").unwrap();
        assert_eq!(client.execute(stmt, ExecMode::Default), Ok(1));
        assert_eq!(client.fetch(stmt), Ok(Some(0)));
        assert_eq!(
            client.query_value(stmt, 1),
            Ok(QueryValue::from(NativeData::Int64(1)))
        );
        assert_eq!(client.fetch(stmt), Ok(None));
        assert_eq!(client.release_statement(stmt), Ok(()));
        assert_eq!(client.open_statements(), 0);
        assert_eq!(client.released_statements(), vec![stmt]);
    }

    #[test]
    fn test_scripted_failure_sets_last_error() {
        let client = InMemoryNativeClient::new().with_failure_after(
            NativeCall::Prepare,
            1,
            ErrorInfo::new(900, "ORA-00900: invalid SQL statement"),
        );
        let (context, conn) = connect(&client);

        assert!(client.prepare_statement(conn, false, b"SELECT 1 FROM dual", b"").is_ok());
        assert_eq!(
            client.prepare_statement(conn, false, b"SELEC", b""),
            Err(NativeFailure)
        );
        assert_eq!(client.get_error(context).code, 900);
        assert!(client.prepare_statement(conn, false, b"SELECT 1 FROM dual", b"").is_ok());
    }

    #[test]
    fn test_binds_are_recorded() {
        let client = InMemoryNativeClient::new();
        let (_, conn) = connect(&client);

        let stmt = client.prepare_statement(conn, false, b"SELECT :1 FROM dual", b"").unwrap();
        client
            .bind_value_by_pos(stmt, 1, NativeTypeNum::Int64, &NativeData::Int64(5))
            .unwrap();

        let recorded = client.last_statement().unwrap();
        assert_eq!(recorded.sql, "SELECT :1 FROM dual");
        assert_eq!(
            recorded.binds,
            vec![RecordedBind {
                position: 1,
                native_type: NativeTypeNum::Int64,
                data: NativeData::Int64(5),
            }]
        );
    }

    #[test]
    fn test_scripted_column_count_failure() {
        let client = InMemoryNativeClient::new().with_failure(
            NativeCall::QueryColumns,
            ErrorInfo::new(4068, "ORA-04068: existing state of packages has been discarded"),
        );
        let (context, conn) = connect(&client);

        let stmt = client.prepare_statement(conn, false, b"SELECT 1 FROM dual", b"").unwrap();
        assert_eq!(client.num_query_columns(stmt), Err(NativeFailure));
        assert_eq!(client.get_error(context).code, 4068);
        assert_eq!(client.num_query_columns(stmt), Ok(0));
    }

    #[test]
    fn test_failed_release_keeps_statement_open() {
        let client = InMemoryNativeClient::new()
            .with_failure(NativeCall::Release, ErrorInfo::new(1002, "DPI-1002: invalid handle"));
        let (context, conn) = connect(&client);

        let stmt = client.prepare_statement(conn, false, b"SELECT 1 FROM dual", b"").unwrap();
        assert_eq!(client.release_statement(stmt), Err(NativeFailure));
        assert_eq!(client.get_error(context).code, 1002);
        assert_eq!(client.open_statements(), 1);

        assert_eq!(client.release_statement(stmt), Ok(()));
        assert_eq!(client.released_statements(), vec![stmt]);
    }

    #[test]
    fn test_destroy_context_ignores_scripted_failures() {
        let client = InMemoryNativeClient::new()
            .with_failure(NativeCall::DestroyContext, ErrorInfo::new(1, "unused"));
        let (context, _) = connect(&client);

        client.destroy_context(context);

        assert_eq!(client.open_contexts(), 0);
        assert_eq!(client.call_count(NativeCall::DestroyContext), 1);
    }

    #[test]
    fn test_closed_connection_rejects_prepare() {
        let client = InMemoryNativeClient::new();
        let (_, conn) = connect(&client);

        client.close_connection(conn, CloseMode::Default, b"").unwrap();
        assert_eq!(client.open_connections(), 0);
        assert!(client.prepare_statement(conn, false, b"SELECT 1 FROM dual", b"").is_err());
    }
}
