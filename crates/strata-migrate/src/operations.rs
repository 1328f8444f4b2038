//! Migration operations.
//!
//! A closed set of schema-change operations, a kind tag for bucketing,
//! and the [`OperationCollection`] the differ accumulates into. The
//! canonical emission order lives here as [`CANONICAL_KIND_ORDER`]; the
//! flatten over it is [`canonical_flatten`], a free function rather than
//! a collection method so the ordering policy stays in one place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{Column, DefaultValue, SchemaQualifiedName, Sequence, Table};

/// A single migration operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MigrationOperation {
    /// Create a table, including its columns and primary key. Foreign
    /// keys and indexes are carried by separate operations.
    CreateTable {
        /// The table to create.
        table: Table,
    },

    /// Drop a table.
    DropTable {
        /// Qualified table name.
        name: SchemaQualifiedName,
    },

    /// Move a table to another schema.
    MoveTable {
        /// Current qualified table name.
        name: SchemaQualifiedName,
        /// Destination schema.
        new_schema: String,
    },

    /// Rename a table within its current schema.
    RenameTable {
        /// Qualified name in the current schema.
        name: SchemaQualifiedName,
        /// New table name, without a schema part.
        new_name: String,
    },

    /// Add a column to a table.
    AddColumn {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Column definition.
        column: Column,
    },

    /// Drop a column from a table.
    DropColumn {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Column name.
        column_name: String,
    },

    /// Alter a column to a new definition.
    AlterColumn {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// The new column definition.
        column: Column,
        /// Whether the alteration may lose data.
        destructive: bool,
    },

    /// Rename a column.
    RenameColumn {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Current column name.
        old_name: String,
        /// New column name.
        new_name: String,
    },

    /// Add a primary key constraint.
    AddPrimaryKey {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Constraint name.
        name: String,
        /// Key columns, in order.
        columns: Vec<String>,
        /// Whether the key backs a clustered index.
        clustered: bool,
    },

    /// Drop a primary key constraint.
    DropPrimaryKey {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Constraint name.
        name: String,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Constraint name.
        name: String,
        /// Referencing columns, in order.
        columns: Vec<String>,
        /// Referenced table.
        ref_table: SchemaQualifiedName,
        /// Referenced columns, in order.
        ref_columns: Vec<String>,
        /// Whether deletes cascade.
        cascade_delete: bool,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Constraint name.
        name: String,
    },

    /// Add a default constraint to a column.
    AddDefaultConstraint {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Column name.
        column_name: String,
        /// Default value, if any.
        value: Option<DefaultValue>,
        /// Default SQL expression, if any.
        sql: Option<String>,
    },

    /// Drop the default constraint from a column.
    DropDefaultConstraint {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Column name.
        column_name: String,
    },

    /// Create an index.
    CreateIndex {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Index name.
        name: String,
        /// Indexed columns, in order.
        columns: Vec<String>,
        /// Whether the index is unique.
        unique: bool,
        /// Whether the index is clustered.
        clustered: bool,
    },

    /// Drop an index.
    DropIndex {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Index name.
        name: String,
    },

    /// Rename an index.
    RenameIndex {
        /// Qualified table name.
        table: SchemaQualifiedName,
        /// Current index name.
        old_name: String,
        /// New index name.
        new_name: String,
    },

    /// Create a sequence.
    CreateSequence {
        /// The sequence to create.
        sequence: Sequence,
    },

    /// Drop a sequence.
    DropSequence {
        /// Qualified sequence name.
        name: SchemaQualifiedName,
    },
}

/// Kind tag of a migration operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum OperationKind {
    /// `DropIndex` operations.
    DropIndex,
    /// `DropForeignKey` operations.
    DropForeignKey,
    /// `DropPrimaryKey` operations.
    DropPrimaryKey,
    /// `DropDefaultConstraint` operations.
    DropDefaultConstraint,
    /// `DropColumn` operations.
    DropColumn,
    /// `DropTable` operations.
    DropTable,
    /// `DropSequence` operations.
    DropSequence,
    /// `MoveTable` operations.
    MoveTable,
    /// `RenameTable` operations.
    RenameTable,
    /// `RenameColumn` operations.
    RenameColumn,
    /// `RenameIndex` operations.
    RenameIndex,
    /// `CreateSequence` operations.
    CreateSequence,
    /// `CreateTable` operations.
    CreateTable,
    /// `AddColumn` operations.
    AddColumn,
    /// `AlterColumn` operations.
    AlterColumn,
    /// `AddDefaultConstraint` operations.
    AddDefaultConstraint,
    /// `AddPrimaryKey` operations.
    AddPrimaryKey,
    /// `AddForeignKey` operations.
    AddForeignKey,
    /// `CreateIndex` operations.
    CreateIndex,
}

/// The canonical emission order.
///
/// Destructive and loosening steps first, then relocations and renames
/// of surviving objects, then constructive steps in dependency order:
/// tables before columns before constraints before foreign keys and
/// indexes.
pub const CANONICAL_KIND_ORDER: [OperationKind; 19] = [
    OperationKind::DropIndex,
    OperationKind::DropForeignKey,
    OperationKind::DropPrimaryKey,
    OperationKind::DropDefaultConstraint,
    OperationKind::DropColumn,
    OperationKind::DropTable,
    OperationKind::DropSequence,
    OperationKind::MoveTable,
    OperationKind::RenameTable,
    OperationKind::RenameColumn,
    OperationKind::RenameIndex,
    OperationKind::CreateSequence,
    OperationKind::CreateTable,
    OperationKind::AddColumn,
    OperationKind::AlterColumn,
    OperationKind::AddDefaultConstraint,
    OperationKind::AddPrimaryKey,
    OperationKind::AddForeignKey,
    OperationKind::CreateIndex,
];

impl MigrationOperation {
    /// Returns the kind tag of this operation.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateTable { .. } => OperationKind::CreateTable,
            Self::DropTable { .. } => OperationKind::DropTable,
            Self::MoveTable { .. } => OperationKind::MoveTable,
            Self::RenameTable { .. } => OperationKind::RenameTable,
            Self::AddColumn { .. } => OperationKind::AddColumn,
            Self::DropColumn { .. } => OperationKind::DropColumn,
            Self::AlterColumn { .. } => OperationKind::AlterColumn,
            Self::RenameColumn { .. } => OperationKind::RenameColumn,
            Self::AddPrimaryKey { .. } => OperationKind::AddPrimaryKey,
            Self::DropPrimaryKey { .. } => OperationKind::DropPrimaryKey,
            Self::AddForeignKey { .. } => OperationKind::AddForeignKey,
            Self::DropForeignKey { .. } => OperationKind::DropForeignKey,
            Self::AddDefaultConstraint { .. } => OperationKind::AddDefaultConstraint,
            Self::DropDefaultConstraint { .. } => OperationKind::DropDefaultConstraint,
            Self::CreateIndex { .. } => OperationKind::CreateIndex,
            Self::DropIndex { .. } => OperationKind::DropIndex,
            Self::RenameIndex { .. } => OperationKind::RenameIndex,
            Self::CreateSequence { .. } => OperationKind::CreateSequence,
            Self::DropSequence { .. } => OperationKind::DropSequence,
        }
    }

    /// Returns true if this operation removes objects or may lose data.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        match self {
            Self::DropTable { .. }
            | Self::DropColumn { .. }
            | Self::DropSequence { .. } => true,
            Self::AlterColumn { destructive, .. } => *destructive,
            _ => false,
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { table } => format!("Create table '{}'", table.name),
            Self::DropTable { name } => format!("Drop table '{name}'"),
            Self::MoveTable { name, new_schema } => {
                format!("Move table '{name}' to schema '{new_schema}'")
            }
            Self::RenameTable { name, new_name } => {
                format!("Rename table '{name}' to '{new_name}'")
            }
            Self::AddColumn { table, column } => {
                format!("Add column '{}' to table '{table}'", column.name)
            }
            Self::DropColumn { table, column_name } => {
                format!("Drop column '{column_name}' from table '{table}'")
            }
            Self::AlterColumn { table, column, .. } => {
                format!("Alter column '{}' in table '{table}'", column.name)
            }
            Self::RenameColumn {
                table,
                old_name,
                new_name,
            } => format!("Rename column '{old_name}' to '{new_name}' in table '{table}'"),
            Self::AddPrimaryKey { table, name, .. } => {
                format!("Add primary key '{name}' to table '{table}'")
            }
            Self::DropPrimaryKey { table, name } => {
                format!("Drop primary key '{name}' from table '{table}'")
            }
            Self::AddForeignKey { table, name, .. } => {
                format!("Add foreign key '{name}' to table '{table}'")
            }
            Self::DropForeignKey { table, name } => {
                format!("Drop foreign key '{name}' from table '{table}'")
            }
            Self::AddDefaultConstraint {
                table, column_name, ..
            } => format!("Add default constraint on '{table}'.'{column_name}'"),
            Self::DropDefaultConstraint { table, column_name } => {
                format!("Drop default constraint on '{table}'.'{column_name}'")
            }
            Self::CreateIndex { table, name, .. } => {
                format!("Create index '{name}' on table '{table}'")
            }
            Self::DropIndex { table, name } => {
                format!("Drop index '{name}' on table '{table}'")
            }
            Self::RenameIndex {
                table,
                old_name,
                new_name,
            } => format!("Rename index '{old_name}' to '{new_name}' on table '{table}'"),
            Self::CreateSequence { sequence } => {
                format!("Create sequence '{}'", sequence.name)
            }
            Self::DropSequence { name } => format!("Drop sequence '{name}'"),
        }
    }
}

/// Operations bucketed by kind, preserving insertion order per kind.
#[derive(Debug, Clone, Default)]
pub struct OperationCollection {
    buckets: BTreeMap<OperationKind, Vec<MigrationOperation>>,
}

impl OperationCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation to its kind bucket.
    pub fn push(&mut self, operation: MigrationOperation) {
        self.buckets
            .entry(operation.kind())
            .or_default()
            .push(operation);
    }

    /// Appends all operations from the iterator.
    pub fn extend(&mut self, operations: impl IntoIterator<Item = MigrationOperation>) {
        for operation in operations {
            self.push(operation);
        }
    }

    /// Returns the operations of one kind, in insertion order.
    #[must_use]
    pub fn get(&self, kind: OperationKind) -> &[MigrationOperation] {
        self.buckets.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Removes and returns the operations of one kind.
    #[must_use]
    pub fn take(&mut self, kind: OperationKind) -> Vec<MigrationOperation> {
        self.buckets.remove(&kind).unwrap_or_default()
    }

    /// Replaces the operations of one kind.
    pub fn replace(&mut self, kind: OperationKind, operations: Vec<MigrationOperation>) {
        if operations.is_empty() {
            self.buckets.remove(&kind);
        } else {
            self.buckets.insert(kind, operations);
        }
    }

    /// Returns true if an identical operation is already present.
    #[must_use]
    pub fn contains(&self, operation: &MigrationOperation) -> bool {
        self.get(operation.kind()).contains(operation)
    }

    /// Total number of operations across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Returns true if the collection holds no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }
}

/// Flattens a collection into the canonical emission order.
///
/// Kinds follow [`CANONICAL_KIND_ORDER`]; within a kind, insertion
/// order is preserved.
#[must_use]
pub fn canonical_flatten(mut collection: OperationCollection) -> Vec<MigrationOperation> {
    let mut operations = Vec::with_capacity(collection.len());
    for kind in CANONICAL_KIND_ORDER {
        operations.extend(collection.take(kind));
    }
    operations
}
