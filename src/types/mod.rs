mod row;
mod value;

pub use row::{Column, ColumnOffsets, Row};
pub use value::Value;
