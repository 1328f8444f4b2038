//! Database snapshot types.
//!
//! These types describe the structure of a database at a point in time:
//! tables, columns, keys, indexes and sequences, all under
//! schema-qualified names. Snapshots are immutable value objects; the
//! differ reads two of them and never mutates either.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// A schema-qualified object name, compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaQualifiedName {
    /// Schema (namespace) part.
    pub schema: String,
    /// Object name part.
    pub name: String,
}

impl SchemaQualifiedName {
    /// Creates a qualified name from schema and name parts.
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SchemaQualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for SchemaQualifiedName {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        let (schema, name) = s.split_once('.').ok_or_else(|| {
            MigrateError::InvalidInput(format!("'{s}' is not a schema-qualified name"))
        })?;
        if schema.is_empty() || name.is_empty() {
            return Err(MigrateError::InvalidInput(format!(
                "'{s}' has an empty schema or name part"
            )));
        }
        Ok(Self::new(schema, name))
    }
}

/// Opaque identity of the source type a column was mapped from.
///
/// Two columns carry the same source type iff the values compare equal;
/// the content is never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceType(pub String);

impl SourceType {
    /// Creates a source-type identity.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }
}

/// When a column's value is generated by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueGeneration {
    /// Values are always supplied by the caller.
    #[default]
    None,
    /// The store generates the value on insert (identity columns).
    OnInsert,
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
}

impl DefaultValue {
    /// Returns the SQL literal for this default value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Identity of the source type this column was mapped from.
    pub source_type: SourceType,
    /// Physical store type (e.g. `int`, `nvarchar`).
    pub data_type: String,
    /// Whether the column allows NULL.
    pub nullable: bool,
    /// Store value generation strategy.
    pub value_generation: ValueGeneration,
    /// Whether this is a row-version (timestamp) column.
    pub timestamp: bool,
    /// Maximum length for sized types.
    pub max_length: Option<u32>,
    /// Precision for numeric types.
    pub precision: Option<u8>,
    /// Scale for numeric types.
    pub scale: Option<u8>,
    /// Whether the type is fixed-length.
    pub fixed_length: bool,
    /// Whether the type is a unicode string type.
    pub unicode: bool,
    /// Default value, if any.
    pub default_value: Option<DefaultValue>,
    /// Default SQL expression, if any.
    pub default_sql: Option<String>,
}

impl Column {
    /// Creates a nullable column with the given name and types.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_type: SourceType::new(source_type),
            data_type: data_type.into(),
            nullable: true,
            value_generation: ValueGeneration::None,
            timestamp: false,
            max_length: None,
            precision: None,
            scale: None,
            fixed_length: false,
            unicode: false,
            default_value: None,
            default_sql: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column value as generated on insert.
    #[must_use]
    pub fn generated_on_insert(mut self) -> Self {
        self.value_generation = ValueGeneration::OnInsert;
        self
    }

    /// Marks the column as a row-version column.
    #[must_use]
    pub fn timestamp(mut self) -> Self {
        self.timestamp = true;
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub fn max_length(mut self, length: u32) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Sets precision and scale.
    #[must_use]
    pub fn precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Marks the type as fixed-length.
    #[must_use]
    pub fn fixed_length(mut self) -> Self {
        self.fixed_length = true;
        self
    }

    /// Marks the type as unicode.
    #[must_use]
    pub fn unicode(mut self) -> Self {
        self.unicode = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Sets the default SQL expression.
    #[must_use]
    pub fn default_sql(mut self, sql: impl Into<String>) -> Self {
        self.default_sql = Some(sql.into());
        self
    }

    /// Returns true if the column carries a default value or expression.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.default_value.is_some() || self.default_sql.is_some()
    }
}

/// A table's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Constraint name.
    pub name: String,
    /// Owning table.
    pub table: SchemaQualifiedName,
    /// Key columns, in order.
    pub columns: Vec<String>,
    /// Whether the key backs a clustered index.
    pub clustered: bool,
}

impl PrimaryKey {
    /// Creates a clustered primary key.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        table: SchemaQualifiedName,
        columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            columns,
            clustered: true,
        }
    }

    /// Marks the key nonclustered.
    #[must_use]
    pub fn nonclustered(mut self) -> Self {
        self.clustered = false;
        self
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Owning table.
    pub table: SchemaQualifiedName,
    /// Referencing columns, in order.
    pub columns: Vec<String>,
    /// Referenced table.
    pub ref_table: SchemaQualifiedName,
    /// Referenced columns, same length as `columns`.
    pub ref_columns: Vec<String>,
    /// Whether deletes cascade.
    pub cascade_delete: bool,
    /// Whether the relationship is one-to-one.
    pub unique: bool,
    /// Whether the referencing side is required.
    pub required: bool,
}

impl ForeignKey {
    /// Creates a required, non-cascading foreign key.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        table: SchemaQualifiedName,
        columns: Vec<String>,
        ref_table: SchemaQualifiedName,
        ref_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            columns,
            ref_table,
            ref_columns,
            cascade_delete: false,
            unique: false,
            required: true,
        }
    }

    /// Enables cascade delete.
    #[must_use]
    pub fn cascade_delete(mut self) -> Self {
        self.cascade_delete = true;
        self
    }

    /// Marks the relationship one-to-one.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the referencing side optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// An index over table columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Owning table.
    pub table: SchemaQualifiedName,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Whether the index is clustered.
    pub clustered: bool,
}

impl Index {
    /// Creates a non-unique, nonclustered index.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        table: SchemaQualifiedName,
        columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            columns,
            unique: false,
            clustered: false,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Makes the index clustered.
    #[must_use]
    pub fn clustered(mut self) -> Self {
        self.clustered = true;
        self
    }
}

/// A database sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Sequence name.
    pub name: SchemaQualifiedName,
    /// Store type of generated values, if declared.
    pub data_type: Option<String>,
    /// First value.
    pub start_value: i64,
    /// Step between values.
    pub increment_by: i64,
}

impl Sequence {
    /// Creates a sequence starting at 1 with increment 1.
    #[must_use]
    pub fn new(name: SchemaQualifiedName) -> Self {
        Self {
            name,
            data_type: None,
            start_value: 1,
            increment_by: 1,
        }
    }

    /// Sets the first value.
    #[must_use]
    pub fn start_with(mut self, value: i64) -> Self {
        self.start_value = value;
        self
    }

    /// Sets the increment.
    #[must_use]
    pub fn increment_by(mut self, value: i64) -> Self {
        self.increment_by = value;
        self
    }

    /// Declares the store type of generated values.
    #[must_use]
    pub fn as_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }
}

/// A table: columns, optional primary key, foreign keys and indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Qualified table name.
    pub name: SchemaQualifiedName,
    /// Columns, in declaration order.
    pub columns: Vec<Column>,
    /// Primary key, if any.
    pub primary_key: Option<PrimaryKey>,
    /// Foreign keys, in declaration order.
    pub foreign_keys: Vec<ForeignKey>,
    /// Indexes, in declaration order.
    pub indexes: Vec<Index>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: SchemaQualifiedName) -> Self {
        Self {
            name,
            columns: Vec::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub fn primary_key(mut self, primary_key: PrimaryKey) -> Self {
        self.primary_key = Some(primary_key);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A complete database snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseModel {
    /// Tables, unique by qualified name.
    pub tables: Vec<Table>,
    /// Sequences.
    pub sequences: Vec<Sequence>,
}

impl DatabaseModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds a sequence.
    #[must_use]
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    /// Gets a table by qualified name.
    #[must_use]
    pub fn get_table(&self, name: &SchemaQualifiedName) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == *name)
    }

    /// Checks the structural invariants of the snapshot.
    ///
    /// Table names must be unique, identifiers non-empty, every key,
    /// foreign-key and index column reference must resolve to a column
    /// of the owning table, and foreign-key column lists must have the
    /// same length on both sides.
    pub fn validate(&self) -> Result<()> {
        for (i, table) in self.tables.iter().enumerate() {
            if table.name.schema.is_empty() || table.name.name.is_empty() {
                return Err(MigrateError::InvalidInput(format!(
                    "table '{}' has an empty schema or name part",
                    table.name
                )));
            }
            if self.tables[..i].iter().any(|t| t.name == table.name) {
                return Err(MigrateError::InvariantViolation(format!(
                    "duplicate table '{}'",
                    table.name
                )));
            }
            for (j, column) in table.columns.iter().enumerate() {
                if column.name.is_empty() {
                    return Err(MigrateError::InvalidInput(format!(
                        "table '{}' has a column with an empty name",
                        table.name
                    )));
                }
                if table.columns[..j].iter().any(|c| c.name == column.name) {
                    return Err(MigrateError::InvariantViolation(format!(
                        "duplicate column '{}' in table '{}'",
                        column.name, table.name
                    )));
                }
            }
            if let Some(primary_key) = &table.primary_key {
                Self::check_columns(table, &primary_key.columns, "primary key")?;
            }
            for foreign_key in &table.foreign_keys {
                Self::check_columns(table, &foreign_key.columns, "foreign key")?;
                if foreign_key.columns.len() != foreign_key.ref_columns.len() {
                    return Err(MigrateError::InvariantViolation(format!(
                        "foreign key '{}' on '{}' references {} columns with {} local columns",
                        foreign_key.name,
                        table.name,
                        foreign_key.ref_columns.len(),
                        foreign_key.columns.len()
                    )));
                }
            }
            for index in &table.indexes {
                Self::check_columns(table, &index.columns, "index")?;
            }
        }
        Ok(())
    }

    fn check_columns(table: &Table, columns: &[String], what: &str) -> Result<()> {
        for column in columns {
            if table.get_column(column).is_none() {
                return Err(MigrateError::InvariantViolation(format!(
                    "{what} on '{}' references missing column '{column}'",
                    table.name
                )));
            }
        }
        Ok(())
    }
}
