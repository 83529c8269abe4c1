//! orars - An async Oracle driver over a blocking native client
//!
//! Native calls run on a worker pool; rows come back to the event loop one
//! callback at a time.
//!
//! # Example
//! ```ignore
//! use orars::{query, Connection, ConnectOptions, OracleDatabase, Value};
//!
//! // Connect to database
//! let connection = Connection::connect_default(client, ConnectOptions::from_env()?).await?;
//!
//! // Execute a query with a bound parameter
//! let rows = connection
//!     .query_all(query!("SELECT " {1i64} " AS value FROM dual"))
//!     .await?;
//!
//! let value = rows[0].column("value").and_then(Value::integer);
//! connection.close().await?;
//! ```

pub mod config;
pub mod error;
pub mod native;
pub mod query;
pub mod traits;
pub mod types;
pub mod worker;

mod connection;
mod statement;

// Re-export main types for convenient access
pub use config::{AuthorizationMode, ConnectOptions};
pub use connection::Connection;
pub use error::{BoxError, OraRsError, Result};
pub use query::{Bindings, Query, QueryBuilder};
pub use traits::{ConnectionFuture, Logged, OnRow, OracleDatabase, ValueConvertible};
pub use types::{Column, ColumnOffsets, Row, Value};
pub use worker::WorkerPool;
