//! Schema differ and dialect-aware migration SQL generator.
//!
//! `strata-migrate` compares two schema models and produces the ordered
//! migration operations that transform one into the other, then renders
//! those operations as dialect-correct SQL. It performs no I/O and
//! executes nothing; inputs are in-memory models and outputs are
//! in-memory operations and statements.
//!
//! # Architecture
//!
//! - **Schema model** ([`schema`]) - passive snapshot of tables,
//!   columns, keys, indexes and sequences.
//! - **Entity model** ([`model`]) - the source-side shape the matcher
//!   pairs on, with its projection into a snapshot.
//! - **Operations** ([`operations`]) - the closed set of migration
//!   operations, bucketed by kind and flattened in canonical order.
//! - **Matcher** ([`matcher`]) - exact-name then structural pairing of
//!   entities, properties, keys, foreign keys and indexes.
//! - **Differ** ([`differ`]) - emits operations from the pairings and
//!   breaks rename chains and swaps with temporary names.
//! - **Dialects** ([`dialect`]) - visitor-per-operation SQL rendering
//!   with a dialect-neutral base and a SQL Server specialization.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_migrate::prelude::*;
//!
//! let differ = ModelDiffer::new();
//! let operations = differ.diff(&source, &target)?;
//!
//! let mut generator = dialect::create(
//!     Dialect::SqlServer,
//!     source.to_database()?,
//!     target.to_database()?,
//! );
//! for statement in generator.generate(&operations)? {
//!     println!("{}", statement.text);
//! }
//! ```
//!
//! Generator instances carry mutable rendering state; construct a fresh
//! one per generation request. The models themselves are read-only and
//! freely shareable.

pub mod builder;
pub mod dialect;
pub mod differ;
pub mod error;
pub mod matcher;
pub mod model;
pub mod operations;
pub mod schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{self, Dialect, GenericSqlGenerator, SqlGenerator, SqlServerGenerator, SqlStatement};
    pub use crate::differ::{create_schema, drop_schema, DifferOptions, ModelDiffer};
    pub use crate::error::{MigrateError, Result};
    pub use crate::model::{
        EntityForeignKey, EntityIndex, EntityKey, EntityModel, EntityType, Property,
    };
    pub use crate::operations::{
        canonical_flatten, MigrationOperation, OperationCollection, OperationKind,
        CANONICAL_KIND_ORDER,
    };
    pub use crate::schema::{
        Column, DatabaseModel, DefaultValue, ForeignKey, Index, PrimaryKey,
        SchemaQualifiedName, Sequence, SourceType, Table, ValueGeneration,
    };
}
