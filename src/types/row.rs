use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::traits::ValueConvertible;
use crate::types::Value;

/// Column names of one result set and their positions.
/// Built once per executed statement and shared by every row it produces.
#[derive(Debug)]
pub struct ColumnOffsets {
    offsets: Vec<(String, usize)>,
    lookup_table: HashMap<String, usize>,
}

impl ColumnOffsets {
    /// Creates offsets from column names in result order.
    /// When two columns share a name, lookups resolve to the first one.
    pub fn new(names: Vec<String>) -> Self {
        let offsets: Vec<(String, usize)> = names
            .into_iter()
            .enumerate()
            .map(|(position, name)| (name, position))
            .collect();

        let mut lookup_table = HashMap::with_capacity(offsets.len());
        for (name, position) in &offsets {
            lookup_table.entry(name.to_uppercase()).or_insert(*position);
        }

        Self {
            offsets,
            lookup_table,
        }
    }

    /// Case-insensitive position lookup.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.lookup_table.get(&name.to_uppercase()).copied()
    }

    /// Column names with their positions, in result order.
    pub fn offsets(&self) -> &[(String, usize)] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// A named value of a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column<'a> {
    pub name: &'a str,
    pub value: &'a Value,
}

impl fmt::Display for Column<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// A single row of a result set.
/// Rows stay valid after the statement that produced them is released.
#[derive(Debug, Clone)]
pub struct Row {
    offsets: Arc<ColumnOffsets>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(offsets: Arc<ColumnOffsets>, values: Vec<Value>) -> Self {
        Self { offsets, values }
    }

    /// Gets a value by column name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.offsets
            .lookup(name)
            .and_then(|position| self.values.get(position))
    }

    /// Decodes a column into `T`. `None` if the column is missing or holds
    /// a different variant.
    pub fn get<T: ValueConvertible>(&self, name: &str) -> Option<T> {
        self.column(name).and_then(T::from_value)
    }

    /// All columns in result order.
    pub fn columns(&self) -> Vec<Column<'_>> {
        self.offsets
            .offsets()
            .iter()
            .filter_map(|(name, position)| {
                self.values.get(*position).map(|value| Column {
                    name: name.as_str(),
                    value,
                })
            })
            .collect()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn offsets(&self) -> &Arc<ColumnOffsets> {
        &self.offsets
    }

    /// Returns the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, column) in self.columns().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{column}")?;
        }
        f.write_str("]")
    }
}
