mod convertible;
mod database;

pub use convertible::ValueConvertible;
pub use database::{ConnectionFuture, Logged, OnRow, OracleDatabase};
