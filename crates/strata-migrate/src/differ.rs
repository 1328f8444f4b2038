//! The model differ.
//!
//! Compares a source and a target entity model and produces the
//! migration operations that transform the source database into the
//! target database, flattened in the canonical emission order.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::matcher::{self, TablePairing};
use crate::model::EntityModel;
use crate::operations::{
    canonical_flatten, MigrationOperation, OperationCollection, OperationKind,
};
use crate::schema::{Column, DatabaseModel, SchemaQualifiedName, Table};

/// Options for the differ.
#[derive(Debug, Clone)]
pub struct DifferOptions {
    /// Minimum structural-similarity ratio for a fuzzy entity pair.
    pub fuzzy_match_ratio: f64,
    /// Prefix of generated temporary names. Must not occur as a prefix
    /// of any identifier in either model; this is not checked.
    pub temp_name_prefix: String,
}

impl Default for DifferOptions {
    fn default() -> Self {
        Self {
            fuzzy_match_ratio: 0.8,
            temp_name_prefix: "__mig_tmp__".to_string(),
        }
    }
}

/// Compares two entity models and emits migration operations.
#[derive(Debug, Default)]
pub struct ModelDiffer {
    options: DifferOptions,
}

impl ModelDiffer {
    /// Creates a differ with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a differ with custom options.
    #[must_use]
    pub fn with_options(options: DifferOptions) -> Self {
        Self { options }
    }

    /// Diffs `source` against `target` and returns the operations in
    /// canonical order.
    pub fn diff(
        &self,
        source: &EntityModel,
        target: &EntityModel,
    ) -> Result<Vec<MigrationOperation>> {
        let source_db = source.to_database()?;
        let target_db = target.to_database()?;
        source_db.validate()?;
        target_db.validate()?;

        let pairings = matcher::match_models(
            source,
            target,
            &source_db,
            &target_db,
            self.options.fuzzy_match_ratio,
        )?;
        debug!(
            source_tables = source_db.tables.len(),
            target_tables = target_db.tables.len(),
            paired = pairings.len(),
            "diffing models"
        );

        let mut operations = OperationCollection::new();
        self.diff_sequences(&source_db, &target_db, &mut operations);
        self.diff_tables(&source_db, &target_db, &pairings, &mut operations);
        self.diff_primary_keys(&source_db, &target_db, &pairings, &mut operations)?;
        for pairing in &pairings {
            let source_table = find_table(&source_db, &pairing.source, "source")?;
            let target_table = find_table(&target_db, &pairing.target, "target")?;
            self.diff_columns(source_table, target_table, pairing, &mut operations);
            self.diff_defaults(source_table, target_table, pairing, &mut operations);
            self.diff_foreign_keys(source_table, target_table, pairing, &mut operations);
            self.diff_indexes(source_table, target_table, pairing, &mut operations);
        }

        resolve_transitive_renames(&mut operations, &self.options.temp_name_prefix);
        Ok(canonical_flatten(operations))
    }

    /// Sequence diffing is deferred; the pass is reserved.
    fn diff_sequences(
        &self,
        _source: &DatabaseModel,
        _target: &DatabaseModel,
        _operations: &mut OperationCollection,
    ) {
    }

    fn diff_tables(
        &self,
        source: &DatabaseModel,
        target: &DatabaseModel,
        pairings: &[TablePairing],
        operations: &mut OperationCollection,
    ) {
        for pairing in pairings {
            if pairing.source.schema != pairing.target.schema {
                operations.push(MigrationOperation::MoveTable {
                    name: pairing.source.clone(),
                    new_schema: pairing.target.schema.clone(),
                });
            }
            if pairing.source.name != pairing.target.name {
                // The move executes before the rename, so the old name
                // already lives in the target schema.
                operations.push(MigrationOperation::RenameTable {
                    name: SchemaQualifiedName::new(
                        pairing.target.schema.clone(),
                        pairing.source.name.clone(),
                    ),
                    new_name: pairing.target.name.clone(),
                });
            }
        }

        for table in &target.tables {
            if pairings.iter().any(|p| p.target == table.name) {
                continue;
            }
            operations.push(MigrationOperation::CreateTable {
                table: table.clone(),
            });
            for fk in &table.foreign_keys {
                operations.push(MigrationOperation::AddForeignKey {
                    table: fk.table.clone(),
                    name: fk.name.clone(),
                    columns: fk.columns.clone(),
                    ref_table: fk.ref_table.clone(),
                    ref_columns: fk.ref_columns.clone(),
                    cascade_delete: fk.cascade_delete,
                });
            }
            for index in &table.indexes {
                operations.push(MigrationOperation::CreateIndex {
                    table: index.table.clone(),
                    name: index.name.clone(),
                    columns: index.columns.clone(),
                    unique: index.unique,
                    clustered: index.clustered,
                });
            }
        }

        for table in &source.tables {
            if pairings.iter().any(|p| p.source == table.name) {
                continue;
            }
            operations.push(MigrationOperation::DropTable {
                name: table.name.clone(),
            });
        }
    }

    fn diff_primary_keys(
        &self,
        source: &DatabaseModel,
        target: &DatabaseModel,
        pairings: &[TablePairing],
        operations: &mut OperationCollection,
    ) -> Result<()> {
        for pairing in pairings {
            if pairing.key_paired {
                continue;
            }
            let source_table = find_table(source, &pairing.source, "source")?;
            let target_table = find_table(target, &pairing.target, "target")?;
            if let Some(pk) = &target_table.primary_key {
                operations.push(MigrationOperation::AddPrimaryKey {
                    table: pairing.target.clone(),
                    name: pk.name.clone(),
                    columns: pk.columns.clone(),
                    clustered: pk.clustered,
                });
            }
            if let Some(pk) = &source_table.primary_key {
                operations.push(MigrationOperation::DropPrimaryKey {
                    table: pairing.target.clone(),
                    name: pk.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn diff_columns(
        &self,
        source_table: &Table,
        target_table: &Table,
        pairing: &TablePairing,
        operations: &mut OperationCollection,
    ) {
        let paired_source: HashSet<&str> =
            pairing.columns.iter().map(|(s, _)| s.as_str()).collect();
        let paired_target: HashSet<&str> =
            pairing.columns.iter().map(|(_, t)| t.as_str()).collect();

        for (source_name, target_name) in &pairing.columns {
            if source_name != target_name {
                operations.push(MigrationOperation::RenameColumn {
                    table: pairing.target.clone(),
                    old_name: source_name.clone(),
                    new_name: target_name.clone(),
                });
            }
        }

        for column in &target_table.columns {
            if !paired_target.contains(column.name.as_str()) {
                operations.push(MigrationOperation::AddColumn {
                    table: pairing.target.clone(),
                    column: column.clone(),
                });
            }
        }

        // Dropped columns are issued against the target-side table name.
        for column in &source_table.columns {
            if !paired_source.contains(column.name.as_str()) {
                operations.push(MigrationOperation::DropColumn {
                    table: pairing.target.clone(),
                    column_name: column.name.clone(),
                });
            }
        }

        for (source_name, target_name) in &pairing.columns {
            let (Some(source_column), Some(target_column)) = (
                source_table.get_column(source_name),
                target_table.get_column(target_name),
            ) else {
                continue;
            };
            if columns_differ(source_column, target_column) {
                // Every alteration is conservatively marked destructive.
                operations.push(MigrationOperation::AlterColumn {
                    table: pairing.target.clone(),
                    column: target_column.clone(),
                    destructive: true,
                });
            }
        }
    }

    fn diff_defaults(
        &self,
        source_table: &Table,
        target_table: &Table,
        pairing: &TablePairing,
        operations: &mut OperationCollection,
    ) {
        let paired_source: HashSet<&str> =
            pairing.columns.iter().map(|(s, _)| s.as_str()).collect();
        let paired_target: HashSet<&str> =
            pairing.columns.iter().map(|(_, t)| t.as_str()).collect();

        for (source_name, target_name) in &pairing.columns {
            let (Some(source_column), Some(target_column)) = (
                source_table.get_column(source_name),
                target_table.get_column(target_name),
            ) else {
                continue;
            };
            if defaults_match(source_column, target_column) {
                continue;
            }
            if target_column.has_default() {
                operations.push(MigrationOperation::AddDefaultConstraint {
                    table: pairing.target.clone(),
                    column_name: target_column.name.clone(),
                    value: target_column.default_value.clone(),
                    sql: target_column.default_sql.clone(),
                });
            }
            if source_column.has_default() {
                // The drop executes before renames, so the constraint is
                // discovered under the source-side column name.
                operations.push(MigrationOperation::DropDefaultConstraint {
                    table: pairing.target.clone(),
                    column_name: source_column.name.clone(),
                });
            }
        }

        for column in &target_table.columns {
            if !paired_target.contains(column.name.as_str()) && column.has_default() {
                operations.push(MigrationOperation::AddDefaultConstraint {
                    table: pairing.target.clone(),
                    column_name: column.name.clone(),
                    value: column.default_value.clone(),
                    sql: column.default_sql.clone(),
                });
            }
        }

        for column in &source_table.columns {
            if !paired_source.contains(column.name.as_str()) && column.has_default() {
                operations.push(MigrationOperation::DropDefaultConstraint {
                    table: pairing.target.clone(),
                    column_name: column.name.clone(),
                });
            }
        }
    }

    fn diff_foreign_keys(
        &self,
        source_table: &Table,
        target_table: &Table,
        pairing: &TablePairing,
        operations: &mut OperationCollection,
    ) {
        let paired_source: HashSet<&str> =
            pairing.foreign_keys.iter().map(|(s, _)| s.as_str()).collect();
        let paired_target: HashSet<&str> =
            pairing.foreign_keys.iter().map(|(_, t)| t.as_str()).collect();

        for fk in &target_table.foreign_keys {
            if !paired_target.contains(fk.name.as_str()) {
                operations.push(MigrationOperation::AddForeignKey {
                    table: pairing.target.clone(),
                    name: fk.name.clone(),
                    columns: fk.columns.clone(),
                    ref_table: fk.ref_table.clone(),
                    ref_columns: fk.ref_columns.clone(),
                    cascade_delete: fk.cascade_delete,
                });
            }
        }

        for fk in &source_table.foreign_keys {
            if !paired_source.contains(fk.name.as_str()) {
                operations.push(MigrationOperation::DropForeignKey {
                    table: pairing.target.clone(),
                    name: fk.name.clone(),
                });
            }
        }
    }

    fn diff_indexes(
        &self,
        source_table: &Table,
        target_table: &Table,
        pairing: &TablePairing,
        operations: &mut OperationCollection,
    ) {
        let paired_source: HashSet<&str> =
            pairing.indexes.iter().map(|(s, _)| s.as_str()).collect();
        let paired_target: HashSet<&str> =
            pairing.indexes.iter().map(|(_, t)| t.as_str()).collect();

        for (source_name, target_name) in &pairing.indexes {
            if source_name != target_name {
                operations.push(MigrationOperation::RenameIndex {
                    table: pairing.target.clone(),
                    old_name: source_name.clone(),
                    new_name: target_name.clone(),
                });
            }
        }

        for index in &target_table.indexes {
            if !paired_target.contains(index.name.as_str()) {
                operations.push(MigrationOperation::CreateIndex {
                    table: pairing.target.clone(),
                    name: index.name.clone(),
                    columns: index.columns.clone(),
                    unique: index.unique,
                    clustered: index.clustered,
                });
            }
        }

        for index in &source_table.indexes {
            if !paired_source.contains(index.name.as_str()) {
                operations.push(MigrationOperation::DropIndex {
                    table: pairing.target.clone(),
                    name: index.name.clone(),
                });
            }
        }
    }
}

/// Returns true if any physical facet other than the defaults differs.
fn columns_differ(source: &Column, target: &Column) -> bool {
    source.data_type != target.data_type
        || source.nullable != target.nullable
        || source.value_generation != target.value_generation
        || source.timestamp != target.timestamp
        || source.max_length != target.max_length
        || source.precision != target.precision
        || source.scale != target.scale
        || source.fixed_length != target.fixed_length
        || source.unicode != target.unicode
}

/// Returns true if both default value and default SQL are equal.
fn defaults_match(source: &Column, target: &Column) -> bool {
    source.default_value == target.default_value && source.default_sql == target.default_sql
}

/// Produces the operations building a database from nothing: sequences,
/// tables, foreign keys, then indexes.
#[must_use]
pub fn create_schema(database: &DatabaseModel) -> Vec<MigrationOperation> {
    let mut operations = Vec::new();
    for sequence in &database.sequences {
        operations.push(MigrationOperation::CreateSequence {
            sequence: sequence.clone(),
        });
    }
    for table in &database.tables {
        operations.push(MigrationOperation::CreateTable {
            table: table.clone(),
        });
    }
    for table in &database.tables {
        for fk in &table.foreign_keys {
            operations.push(MigrationOperation::AddForeignKey {
                table: fk.table.clone(),
                name: fk.name.clone(),
                columns: fk.columns.clone(),
                ref_table: fk.ref_table.clone(),
                ref_columns: fk.ref_columns.clone(),
                cascade_delete: fk.cascade_delete,
            });
        }
    }
    for table in &database.tables {
        for index in &table.indexes {
            operations.push(MigrationOperation::CreateIndex {
                table: index.table.clone(),
                name: index.name.clone(),
                columns: index.columns.clone(),
                unique: index.unique,
                clustered: index.clustered,
            });
        }
    }
    operations
}

/// Produces the operations tearing a database down: sequences, foreign
/// keys, then tables.
#[must_use]
pub fn drop_schema(database: &DatabaseModel) -> Vec<MigrationOperation> {
    let mut operations = Vec::new();
    for sequence in &database.sequences {
        operations.push(MigrationOperation::DropSequence {
            name: sequence.name.clone(),
        });
    }
    for table in &database.tables {
        for fk in &table.foreign_keys {
            operations.push(MigrationOperation::DropForeignKey {
                table: fk.table.clone(),
                name: fk.name.clone(),
            });
        }
    }
    for table in &database.tables {
        operations.push(MigrationOperation::DropTable {
            name: table.name.clone(),
        });
    }
    operations
}

/// Rewrites rename chains and swaps through temporary names.
///
/// Within each rename bucket, a rename whose new name collides with the
/// old name of exactly one later rename in the same scope is redirected
/// to a fresh temporary name; the rename from the temporary to the real
/// name is appended after all direct renames. With more than one
/// collision candidate the rename is kept unchanged. The temporary
/// counter is shared across the three buckets.
pub fn resolve_transitive_renames(operations: &mut OperationCollection, prefix: &str) {
    let mut counter = 0usize;

    // Tables: scope is global, the parent schema is ignored when
    // searching for collisions; the regenerated rename stays in the
    // source-side schema.
    let mut bucket = operations.take(OperationKind::RenameTable);
    let mut deferred = Vec::new();
    let direct = bucket.len();
    for i in 0..direct {
        let MigrationOperation::RenameTable { name, new_name } = bucket[i].clone() else {
            continue;
        };
        let dependents = (i + 1..direct)
            .filter(|&j| {
                matches!(
                    &bucket[j],
                    MigrationOperation::RenameTable { name: later, .. }
                        if later.name == new_name
                )
            })
            .count();
        if dependents == 1 {
            let temp = format!("{prefix}{counter}");
            counter += 1;
            debug!(table = %name, via = %temp, "transitive table rename");
            bucket[i] = MigrationOperation::RenameTable {
                name: name.clone(),
                new_name: temp.clone(),
            };
            deferred.push(MigrationOperation::RenameTable {
                name: SchemaQualifiedName::new(name.schema, temp),
                new_name,
            });
        }
    }
    bucket.extend(deferred);
    operations.replace(OperationKind::RenameTable, bucket);

    // Columns: scope is the parent table.
    let mut bucket = operations.take(OperationKind::RenameColumn);
    let mut deferred = Vec::new();
    let direct = bucket.len();
    for i in 0..direct {
        let MigrationOperation::RenameColumn {
            table,
            old_name,
            new_name,
        } = bucket[i].clone()
        else {
            continue;
        };
        let dependents = (i + 1..direct)
            .filter(|&j| {
                matches!(
                    &bucket[j],
                    MigrationOperation::RenameColumn { table: later_table, old_name: later_old, .. }
                        if *later_table == table && *later_old == new_name
                )
            })
            .count();
        if dependents == 1 {
            let temp = format!("{prefix}{counter}");
            counter += 1;
            debug!(table = %table, column = %old_name, via = %temp, "transitive column rename");
            bucket[i] = MigrationOperation::RenameColumn {
                table: table.clone(),
                old_name,
                new_name: temp.clone(),
            };
            deferred.push(MigrationOperation::RenameColumn {
                table,
                old_name: temp,
                new_name,
            });
        }
    }
    bucket.extend(deferred);
    operations.replace(OperationKind::RenameColumn, bucket);

    // Indexes: scope is the parent table.
    let mut bucket = operations.take(OperationKind::RenameIndex);
    let mut deferred = Vec::new();
    let direct = bucket.len();
    for i in 0..direct {
        let MigrationOperation::RenameIndex {
            table,
            old_name,
            new_name,
        } = bucket[i].clone()
        else {
            continue;
        };
        let dependents = (i + 1..direct)
            .filter(|&j| {
                matches!(
                    &bucket[j],
                    MigrationOperation::RenameIndex { table: later_table, old_name: later_old, .. }
                        if *later_table == table && *later_old == new_name
                )
            })
            .count();
        if dependents == 1 {
            let temp = format!("{prefix}{counter}");
            counter += 1;
            bucket[i] = MigrationOperation::RenameIndex {
                table: table.clone(),
                old_name,
                new_name: temp.clone(),
            };
            deferred.push(MigrationOperation::RenameIndex {
                table,
                old_name: temp,
                new_name,
            });
        }
    }
    bucket.extend(deferred);
    operations.replace(OperationKind::RenameIndex, bucket);
}

fn find_table<'a>(
    database: &'a DatabaseModel,
    name: &SchemaQualifiedName,
    side: &str,
) -> Result<&'a Table> {
    database.get_table(name).ok_or_else(|| {
        MigrateError::InvariantViolation(format!(
            "paired table '{name}' does not exist in the {side} database model"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityForeignKey, EntityIndex, EntityKey, EntityType, Property};
    use crate::schema::{DefaultValue, Index, PrimaryKey};

    fn qname(schema: &str, name: &str) -> SchemaQualifiedName {
        SchemaQualifiedName::new(schema, name)
    }

    fn user_entity() -> EntityType {
        EntityType::new("User", "dbo", "Users")
            .property(Property::new("Id", "int", "int").not_null())
            .property(Property::new("Name", "string", "nvarchar").max_length(255))
            .key(EntityKey::new("PK_Users", vec!["Id".to_string()]))
    }

    fn diff(source: &EntityModel, target: &EntityModel) -> Vec<MigrationOperation> {
        ModelDiffer::new().diff(source, target).unwrap()
    }

    #[test]
    fn identity_diff_is_empty() {
        let model = EntityModel::new().entity(user_entity());
        assert!(diff(&model, &model).is_empty());
    }

    #[test]
    fn renamed_column_produces_single_rename() {
        let source = EntityModel::new().entity(
            EntityType::new("T", "dbo", "T").property(Property::new("Foo", "string", "nvarchar")),
        );
        let target = EntityModel::new().entity(
            EntityType::new("T", "dbo", "T").property(
                Property::new("Foo", "string", "nvarchar").mapped_to("Bar"),
            ),
        );

        let operations = diff(&source, &target);
        assert_eq!(
            operations,
            vec![MigrationOperation::RenameColumn {
                table: qname("dbo", "T"),
                old_name: "Foo".to_string(),
                new_name: "Bar".to_string(),
            }]
        );
    }

    #[test]
    fn swapped_columns_go_through_a_temporary_name() {
        let entity = |first: &str, second: &str| {
            EntityType::new("T", "dbo", "T")
                .property(Property::new("P1", "int", "int").mapped_to(first))
                .property(Property::new("P2", "int", "int").mapped_to(second))
        };
        let source = EntityModel::new().entity(entity("A", "B"));
        let target = EntityModel::new().entity(entity("B", "A"));

        let operations = diff(&source, &target);
        assert_eq!(
            operations,
            vec![
                MigrationOperation::RenameColumn {
                    table: qname("dbo", "T"),
                    old_name: "A".to_string(),
                    new_name: "__mig_tmp__0".to_string(),
                },
                MigrationOperation::RenameColumn {
                    table: qname("dbo", "T"),
                    old_name: "B".to_string(),
                    new_name: "A".to_string(),
                },
                MigrationOperation::RenameColumn {
                    table: qname("dbo", "T"),
                    old_name: "__mig_tmp__0".to_string(),
                    new_name: "B".to_string(),
                },
            ]
        );
    }

    #[test]
    fn rename_chain_is_broken_with_a_temporary() {
        let mut operations = OperationCollection::new();
        operations.push(MigrationOperation::RenameColumn {
            table: qname("dbo", "T"),
            old_name: "A".to_string(),
            new_name: "B".to_string(),
        });
        operations.push(MigrationOperation::RenameColumn {
            table: qname("dbo", "T"),
            old_name: "B".to_string(),
            new_name: "C".to_string(),
        });

        resolve_transitive_renames(&mut operations, "__mig_tmp__");
        let bucket = operations.get(OperationKind::RenameColumn);
        assert_eq!(bucket.len(), 3);
        assert!(matches!(
            &bucket[0],
            MigrationOperation::RenameColumn { new_name, .. } if new_name == "__mig_tmp__0"
        ));
        assert!(matches!(
            &bucket[1],
            MigrationOperation::RenameColumn { old_name, new_name, .. }
                if old_name == "B" && new_name == "C"
        ));
        assert!(matches!(
            &bucket[2],
            MigrationOperation::RenameColumn { old_name, new_name, .. }
                if old_name == "__mig_tmp__0" && new_name == "B"
        ));
    }

    #[test]
    fn ambiguous_rename_dependencies_are_left_alone() {
        // Two later renames share the old name "B"; the first rename
        // keeps its direct form.
        let mut operations = OperationCollection::new();
        for (old, new, table) in [("A", "B", "T"), ("B", "C", "T"), ("B", "D", "T")] {
            operations.push(MigrationOperation::RenameColumn {
                table: qname("dbo", table),
                old_name: old.to_string(),
                new_name: new.to_string(),
            });
        }

        resolve_transitive_renames(&mut operations, "__mig_tmp__");
        let bucket = operations.get(OperationKind::RenameColumn);
        assert_eq!(bucket.len(), 3);
        assert!(matches!(
            &bucket[0],
            MigrationOperation::RenameColumn { new_name, .. } if new_name == "B"
        ));
    }

    #[test]
    fn rename_scope_is_the_parent_table() {
        // Same names in different tables do not collide.
        let mut operations = OperationCollection::new();
        operations.push(MigrationOperation::RenameColumn {
            table: qname("dbo", "T"),
            old_name: "A".to_string(),
            new_name: "B".to_string(),
        });
        operations.push(MigrationOperation::RenameColumn {
            table: qname("dbo", "U"),
            old_name: "B".to_string(),
            new_name: "C".to_string(),
        });

        resolve_transitive_renames(&mut operations, "__mig_tmp__");
        assert_eq!(operations.get(OperationKind::RenameColumn).len(), 2);
    }

    #[test]
    fn swapped_tables_share_the_temporary_counter_scope() {
        let mut operations = OperationCollection::new();
        operations.push(MigrationOperation::RenameTable {
            name: qname("dbo", "A"),
            new_name: "B".to_string(),
        });
        operations.push(MigrationOperation::RenameTable {
            name: qname("dbo", "B"),
            new_name: "A".to_string(),
        });
        operations.push(MigrationOperation::RenameColumn {
            table: qname("dbo", "T"),
            old_name: "X".to_string(),
            new_name: "Y".to_string(),
        });
        operations.push(MigrationOperation::RenameColumn {
            table: qname("dbo", "T"),
            old_name: "Y".to_string(),
            new_name: "X".to_string(),
        });

        resolve_transitive_renames(&mut operations, "__mig_tmp__");
        let tables = operations.get(OperationKind::RenameTable);
        let columns = operations.get(OperationKind::RenameColumn);
        assert!(matches!(
            &tables[0],
            MigrationOperation::RenameTable { new_name, .. } if new_name == "__mig_tmp__0"
        ));
        // The deferred table rename stays in the source-side schema.
        assert!(matches!(
            &tables[2],
            MigrationOperation::RenameTable { name, new_name }
                if name.schema == "dbo" && name.name == "__mig_tmp__0" && new_name == "B"
        ));
        assert!(matches!(
            &columns[0],
            MigrationOperation::RenameColumn { new_name, .. } if new_name == "__mig_tmp__1"
        ));
    }

    #[test]
    fn moved_table_produces_move_operation() {
        let source = EntityModel::new().entity(
            EntityType::new("T", "src", "T").property(Property::new("Id", "int", "int")),
        );
        let target = EntityModel::new().entity(
            EntityType::new("T", "dst", "T").property(Property::new("Id", "int", "int")),
        );

        let operations = diff(&source, &target);
        assert_eq!(
            operations,
            vec![MigrationOperation::MoveTable {
                name: qname("src", "T"),
                new_schema: "dst".to_string(),
            }]
        );
    }

    #[test]
    fn renamed_table_old_name_uses_target_schema() {
        let source = EntityModel::new().entity(
            EntityType::new("T", "src", "Old").property(Property::new("Id", "int", "int")),
        );
        let target = EntityModel::new().entity(
            EntityType::new("T", "dst", "New").property(Property::new("Id", "int", "int")),
        );

        let operations = diff(&source, &target);
        assert_eq!(
            operations,
            vec![
                MigrationOperation::MoveTable {
                    name: qname("src", "Old"),
                    new_schema: "dst".to_string(),
                },
                MigrationOperation::RenameTable {
                    name: qname("dst", "Old"),
                    new_name: "New".to_string(),
                },
            ]
        );
    }

    #[test]
    fn added_not_null_column_with_default_emits_both_operations() {
        let source = EntityModel::new().entity(
            EntityType::new("T", "dbo", "T").property(Property::new("Id", "int", "int")),
        );
        let target = EntityModel::new().entity(
            EntityType::new("T", "dbo", "T")
                .property(Property::new("Id", "int", "int"))
                .property(
                    Property::new("Y", "int", "int")
                        .not_null()
                        .default_value(DefaultValue::Integer(0)),
                ),
        );

        let operations = diff(&source, &target);
        assert_eq!(operations.len(), 2);
        assert!(matches!(
            &operations[0],
            MigrationOperation::AddColumn { column, .. } if column.name == "Y"
        ));
        assert!(matches!(
            &operations[1],
            MigrationOperation::AddDefaultConstraint { column_name, value, sql, .. }
                if column_name == "Y" && *value == Some(DefaultValue::Integer(0)) && sql.is_none()
        ));
    }

    #[test]
    fn dropped_column_is_issued_against_the_target_table_name() {
        let source = EntityModel::new().entity(
            EntityType::new("T", "dbo", "Old")
                .property(Property::new("Id", "int", "int"))
                .property(Property::new("Legacy", "string", "nvarchar")),
        );
        let target = EntityModel::new().entity(
            EntityType::new("T", "dbo", "New").property(Property::new("Id", "int", "int")),
        );

        let operations = diff(&source, &target);
        assert!(operations.iter().any(|op| matches!(
            op,
            MigrationOperation::DropColumn { table, column_name }
                if *table == qname("dbo", "New") && column_name == "Legacy"
        )));
    }

    #[test]
    fn altered_column_is_marked_destructive() {
        let source = EntityModel::new().entity(
            EntityType::new("T", "dbo", "T").property(Property::new("Age", "int", "int")),
        );
        let target = EntityModel::new().entity(
            EntityType::new("T", "dbo", "T")
                .property(Property::new("Age", "int", "bigint")),
        );

        let operations = diff(&source, &target);
        assert_eq!(operations.len(), 1);
        assert!(matches!(
            &operations[0],
            MigrationOperation::AlterColumn { destructive: true, column, .. }
                if column.data_type == "bigint"
        ));
    }

    #[test]
    fn changed_primary_key_is_dropped_and_added() {
        let entity = |key: EntityKey| {
            EntityType::new("T", "dbo", "T")
                .property(Property::new("Id", "int", "int").not_null())
                .key(key)
        };
        let source = EntityModel::new().entity(entity(EntityKey::new(
            "PK_Old",
            vec!["Id".to_string()],
        )));
        let target = EntityModel::new().entity(entity(EntityKey::new(
            "PK_New",
            vec!["Id".to_string()],
        )));

        let operations = diff(&source, &target);
        assert_eq!(
            operations
                .iter()
                .map(MigrationOperation::kind)
                .collect::<Vec<_>>(),
            vec![OperationKind::DropPrimaryKey, OperationKind::AddPrimaryKey]
        );
    }

    #[test]
    fn unpaired_foreign_keys_are_dropped_and_added() {
        let model = |cascade: bool| {
            let mut fk = EntityForeignKey::new(
                "FK_Posts_Users",
                vec!["AuthorId".to_string()],
                "User",
                vec!["Id".to_string()],
            );
            if cascade {
                fk = fk.cascade_delete();
            }
            EntityModel::new()
                .entity(
                    EntityType::new("User", "dbo", "Users")
                        .property(Property::new("Id", "int", "int").not_null()),
                )
                .entity(
                    EntityType::new("Post", "dbo", "Posts")
                        .property(Property::new("Id", "int", "int").not_null())
                        .property(Property::new("AuthorId", "int", "int").not_null())
                        .foreign_key(fk),
                )
        };

        let operations = diff(&model(false), &model(true));
        assert_eq!(
            operations
                .iter()
                .map(MigrationOperation::kind)
                .collect::<Vec<_>>(),
            vec![OperationKind::DropForeignKey, OperationKind::AddForeignKey]
        );
    }

    #[test]
    fn renamed_index_produces_rename_operation() {
        let model = |name: &str| {
            EntityModel::new().entity(
                EntityType::new("T", "dbo", "T")
                    .property(Property::new("A", "int", "int"))
                    .index(EntityIndex::new(name, vec!["A".to_string()])),
            )
        };

        let operations = diff(&model("IX_Old"), &model("IX_New"));
        assert_eq!(
            operations,
            vec![MigrationOperation::RenameIndex {
                table: qname("dbo", "T"),
                old_name: "IX_Old".to_string(),
                new_name: "IX_New".to_string(),
            }]
        );
    }

    #[test]
    fn diff_output_is_in_canonical_order() {
        let source = EntityModel::new()
            .entity(
                EntityType::new("Keep", "dbo", "Keep")
                    .property(Property::new("Id", "int", "int"))
                    .property(Property::new("Gone", "string", "nvarchar"))
                    .index(EntityIndex::new("IX_Gone", vec!["Gone".to_string()])),
            )
            .entity(
                EntityType::new("Dead", "dbo", "Dead")
                    .property(Property::new("Id", "int", "int"))
                    .property(Property::new("Payload", "string", "nvarchar")),
            );
        let target = EntityModel::new()
            .entity(
                EntityType::new("Keep", "dbo", "Keep")
                    .property(Property::new("Id", "int", "int"))
                    .property(Property::new("Fresh", "bool", "bit")),
            )
            .entity(
                EntityType::new("Born", "dbo", "Born")
                    .property(Property::new("Key", "guid", "uniqueidentifier"))
                    .property(Property::new("Score", "decimal", "decimal")),
            );

        let operations = diff(&source, &target);
        let order_of = |kind: OperationKind| {
            crate::operations::CANONICAL_KIND_ORDER
                .iter()
                .position(|k| *k == kind)
                .unwrap()
        };
        let positions: Vec<usize> = operations
            .iter()
            .map(|op| order_of(op.kind()))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
        assert!(operations.iter().any(|op| op.kind() == OperationKind::DropIndex));
        assert!(operations.iter().any(|op| op.kind() == OperationKind::DropTable));
        assert!(operations.iter().any(|op| op.kind() == OperationKind::CreateTable));
        assert!(operations.iter().any(|op| op.kind() == OperationKind::AddColumn));
        assert!(operations.iter().any(|op| op.kind() == OperationKind::DropColumn));
    }

    #[test]
    fn create_and_drop_schema_reference_everything_once() {
        let users = Table::new(qname("dbo", "Users"))
            .column(Column::new("Id", "int", "int").not_null())
            .primary_key(PrimaryKey::new(
                "PK_Users",
                qname("dbo", "Users"),
                vec!["Id".to_string()],
            ));
        let posts = Table::new(qname("dbo", "Posts"))
            .column(Column::new("Id", "int", "int").not_null())
            .column(Column::new("AuthorId", "int", "int").not_null())
            .foreign_key(crate::schema::ForeignKey::new(
                "FK_Posts_Users",
                qname("dbo", "Posts"),
                vec!["AuthorId".to_string()],
                qname("dbo", "Users"),
                vec!["Id".to_string()],
            ))
            .index(Index::new(
                "IX_Posts_AuthorId",
                qname("dbo", "Posts"),
                vec!["AuthorId".to_string()],
            ));
        let database = DatabaseModel::new()
            .table(users)
            .table(posts)
            .sequence(crate::schema::Sequence::new(qname("dbo", "Seq")));

        let create = create_schema(&database);
        assert_eq!(
            create.iter().map(MigrationOperation::kind).collect::<Vec<_>>(),
            vec![
                OperationKind::CreateSequence,
                OperationKind::CreateTable,
                OperationKind::CreateTable,
                OperationKind::AddForeignKey,
                OperationKind::CreateIndex,
            ]
        );

        let drop = drop_schema(&database);
        assert_eq!(
            drop.iter().map(MigrationOperation::kind).collect::<Vec<_>>(),
            vec![
                OperationKind::DropSequence,
                OperationKind::DropForeignKey,
                OperationKind::DropTable,
                OperationKind::DropTable,
            ]
        );
    }
}
