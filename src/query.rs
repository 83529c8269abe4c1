use crate::types::Value;

/// Ordered values bound to a query's positional placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: Vec<Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Appends a value for the next placeholder.
    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }

    pub fn push_null(&mut self) {
        self.values.push(Value::Null);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for Bindings {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}

/// A SQL statement together with its bound values.
///
/// Placeholders are Oracle style (`:1`, `:2`, ...); the n-th binding fills
/// placeholder `:n`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    bindings: Bindings,
}

impl Query {
    /// A query from literal SQL text with no bindings.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Bindings::new(),
        }
    }

    /// A query from SQL text that already contains placeholders.
    pub fn with_bindings(sql: impl Into<String>, bindings: impl Into<Bindings>) -> Self {
        Self {
            sql: sql.into(),
            bindings: bindings.into(),
        }
    }

    /// Start building a query with auto-numbered placeholders.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::new(sql)
    }
}

/// Builds a query from SQL fragments and values, numbering placeholders
/// in the order values are pushed.
///
/// # Example
/// ```
/// use orars::Query;
///
/// let mut builder = Query::builder();
/// builder.push("SELECT ").push_bind(1i64).push(" AS value FROM dual");
/// let query = builder.build();
///
/// assert_eq!(query.sql(), "SELECT :1 AS value FROM dual");
/// assert_eq!(query.bindings().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct QueryBuilder {
    sql: String,
    bindings: Bindings,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends SQL text verbatim.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Binds a value and appends its placeholder. `None` binds NULL.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.bindings.push(value);
        self.push_placeholder()
    }

    /// Binds NULL and appends its placeholder.
    pub fn push_null(&mut self) -> &mut Self {
        self.bindings.push_null();
        self.push_placeholder()
    }

    fn push_placeholder(&mut self) -> &mut Self {
        self.sql.push(':');
        self.sql.push_str(&self.bindings.len().to_string());
        self
    }

    pub fn build(self) -> Query {
        Query {
            sql: self.sql,
            bindings: self.bindings,
        }
    }
}

/// Builds a [`Query`] from string literals and `{expr}` bind values.
///
/// ```
/// use orars::query;
///
/// let id = 7i64;
/// let query = query!("SELECT name FROM users WHERE id = " {id} " AND active = " {true});
///
/// assert_eq!(query.sql(), "SELECT name FROM users WHERE id = :1 AND active = :2");
/// assert_eq!(query.bindings().len(), 2);
/// ```
#[macro_export]
macro_rules! query {
    (@push $builder:ident;) => {};
    (@push $builder:ident; $sql:literal $($rest:tt)*) => {
        $builder.push($sql);
        $crate::query!(@push $builder; $($rest)*);
    };
    (@push $builder:ident; { $value:expr } $($rest:tt)*) => {
        $builder.push_bind($value);
        $crate::query!(@push $builder; $($rest)*);
    };
    ($($parts:tt)+) => {{
        let mut builder = $crate::QueryBuilder::new();
        $crate::query!(@push builder; $($parts)+);
        builder.build()
    }};
}
