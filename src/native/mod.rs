//! The blocking native call surface the driver is built on.
//!
//! Every method on [`NativeClient`] may block. The driver only ever calls
//! them from the worker pool.

mod in_memory_test;

use std::fmt;
use std::num::{NonZeroU64, TryFromIntError};
use std::path::PathBuf;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};

pub use self::in_memory_test::{
    InMemoryNativeClient, InMemoryResultSet, InMemoryResultSetBuilder, NativeCall,
    RecordedBind, RecordedStatement,
};

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NonZeroU64);

        impl $name {
            pub fn new(raw: NonZeroU64) -> Self {
                Self(raw)
            }

            pub fn raw(self) -> NonZeroU64 {
                self.0
            }
        }
    };
}

native_handle!(
    /// Opaque native context handle.
    ContextHandle
);
native_handle!(
    /// Opaque native connection handle.
    ConnHandle
);
native_handle!(
    /// Opaque native statement handle.
    StmtHandle
);

/// Marker for a failed native call. The details are in the context's
/// last-error slot and must be read before the next native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFailure;

pub type NativeResult<T> = std::result::Result<T, NativeFailure>;

/// Error details reported by the native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: i32,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Native type tags, numbered like ODPI-C's `dpiNativeTypeNum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NativeTypeNum {
    Int64 = 3000,
    Float = 3002,
    Double = 3003,
    Bytes = 3004,
    Timestamp = 3005,
    Lob = 3008,
    Null = 3016,
}

impl NativeTypeNum {
    pub fn from_raw(raw: u32) -> Option<Self> {
        let tag = match raw {
            3000 => NativeTypeNum::Int64,
            3002 => NativeTypeNum::Float,
            3003 => NativeTypeNum::Double,
            3004 => NativeTypeNum::Bytes,
            3005 => NativeTypeNum::Timestamp,
            3008 => NativeTypeNum::Lob,
            3016 => NativeTypeNum::Null,
            _ => return None,
        };
        Some(tag)
    }

    pub fn raw(self) -> u32 {
        self as u32
    }
}

/// Broken-down timestamp as exchanged with the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeTimestamp {
    pub year: i16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub fsecond: u32,
    pub tz_hour_offset: i8,
    pub tz_minute_offset: i8,
}

impl NativeTimestamp {
    /// Converts to UTC, applying the timezone offset. `None` if any field is
    /// out of range.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        let date = NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )?;
        let local = date.and_hms_nano_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
            self.fsecond,
        )?;
        let offset = FixedOffset::east_opt(
            i32::from(self.tz_hour_offset) * 3600 + i32::from(self.tz_minute_offset) * 60,
        )?;
        let stamp = offset.from_local_datetime(&local).single()?;
        Some(stamp.with_timezone(&Utc))
    }
}

/// Fails when the year does not fit the native 16-bit field.
impl TryFrom<DateTime<Utc>> for NativeTimestamp {
    type Error = TryFromIntError;

    fn try_from(stamp: DateTime<Utc>) -> Result<Self, Self::Error> {
        Ok(Self {
            year: i16::try_from(stamp.year())?,
            month: u8::try_from(stamp.month())?,
            day: u8::try_from(stamp.day())?,
            hour: u8::try_from(stamp.hour())?,
            minute: u8::try_from(stamp.minute())?,
            second: u8::try_from(stamp.second())?,
            fsecond: stamp.nanosecond(),
            tz_hour_offset: 0,
            tz_minute_offset: 0,
        })
    }
}

/// Tagged data buffer passed to and from the native layer.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeData {
    Null,
    Int64(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Timestamp(NativeTimestamp),
    Lob(Vec<u8>),
}

impl NativeData {
    /// The tag the native layer reports for this payload.
    pub fn native_type(&self) -> NativeTypeNum {
        match self {
            NativeData::Null => NativeTypeNum::Null,
            NativeData::Int64(_) => NativeTypeNum::Int64,
            NativeData::Float(_) => NativeTypeNum::Float,
            NativeData::Double(_) => NativeTypeNum::Double,
            NativeData::Bytes(_) => NativeTypeNum::Bytes,
            NativeData::Timestamp(_) => NativeTypeNum::Timestamp,
            NativeData::Lob(_) => NativeTypeNum::Lob,
        }
    }
}

/// A column value as returned by get-query-value: the raw type tag plus the
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryValue {
    pub native_type: u32,
    pub data: NativeData,
}

impl From<NativeData> for QueryValue {
    fn from(data: NativeData) -> Self {
        Self {
            native_type: data.native_type().raw(),
            data,
        }
    }
}

/// Column metadata returned by get-query-column-info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    pub name: String,
}

/// Version of the native client library the driver was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LibraryVersion {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parameters for context creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextParams {
    pub driver_name: Option<String>,
    pub client_lib_dir: Option<PathBuf>,
    pub client_config_dir: Option<PathBuf>,
}

/// Parameters for connection creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnCreateParams {
    pub auth_mode: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CloseMode {
    #[default]
    Default,
    Drop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecMode {
    #[default]
    Default,
    Describe,
}

/// The blocking native client call surface.
///
/// Implementations wrap an Oracle client library. Calls that fail return
/// [`NativeFailure`]; the caller then reads the details with
/// [`NativeClient::get_error`] before issuing any other call.
pub trait NativeClient: Send + Sync + 'static {
    /// Fixed at build time; never calls into the library.
    fn library_version(&self) -> LibraryVersion;

    /// Creates a context. There is no context to read errors from yet, so
    /// the error is returned directly.
    fn create_context(&self, params: &ContextParams) -> Result<ContextHandle, ErrorInfo>;

    fn destroy_context(&self, context: ContextHandle);

    fn get_error(&self, context: ContextHandle) -> ErrorInfo;

    fn create_connection(
        &self,
        context: ContextHandle,
        username: &[u8],
        password: &[u8],
        connect_string: &[u8],
        params: &ConnCreateParams,
    ) -> NativeResult<ConnHandle>;

    fn close_connection(&self, conn: ConnHandle, mode: CloseMode, tag: &[u8]) -> NativeResult<()>;

    fn prepare_statement(
        &self,
        conn: ConnHandle,
        scrollable: bool,
        sql: &[u8],
        tag: &[u8],
    ) -> NativeResult<StmtHandle>;

    fn bind_value_by_pos(
        &self,
        stmt: StmtHandle,
        pos: u32,
        native_type: NativeTypeNum,
        data: &NativeData,
    ) -> NativeResult<()>;

    /// Executes the statement, returning the number of query columns.
    fn execute(&self, stmt: StmtHandle, mode: ExecMode) -> NativeResult<u32>;

    fn num_query_columns(&self, stmt: StmtHandle) -> NativeResult<u32>;

    /// Column metadata by 1-based position.
    fn query_info(&self, stmt: StmtHandle, pos: u32) -> NativeResult<QueryInfo>;

    /// Value of the current row by 1-based position.
    fn query_value(&self, stmt: StmtHandle, pos: u32) -> NativeResult<QueryValue>;

    /// Advances the cursor. Returns the buffer row index, or `None` once no
    /// rows are left.
    fn fetch(&self, stmt: StmtHandle) -> NativeResult<Option<u32>>;

    fn release_statement(&self, stmt: StmtHandle) -> NativeResult<()>;
}

impl fmt::Display for NativeTypeNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.raw())
    }
}
