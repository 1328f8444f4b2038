//! Microsoft SQL Server dialect.
//!
//! Identifiers are delimited with square brackets, renames go through
//! `sp_rename`, default constraints are named `DF_<table>_<column>` on
//! the way in and discovered from `sys.default_constraints` on the way
//! out. Before rendering, the operation stream is rewritten so that
//! every column alteration is preceded by the drops its validity
//! requires and followed by the corresponding re-adds.

use tracing::debug;

use crate::builder::SqlBuilder;
use crate::error::Result;
use crate::operations::{canonical_flatten, MigrationOperation, OperationCollection};
use crate::schema::{
    Column, DatabaseModel, DefaultValue, SchemaQualifiedName, Table, ValueGeneration,
};

use super::{SqlGenerator, SqlStatement};

/// SQL generator for Microsoft SQL Server.
#[derive(Debug)]
pub struct SqlServerGenerator {
    source: DatabaseModel,
    target: DatabaseModel,
    variable_counter: usize,
}

impl SqlServerGenerator {
    /// Creates a generator resolved against the given source and
    /// target snapshots.
    #[must_use]
    pub fn new(source: DatabaseModel, target: DatabaseModel) -> Self {
        Self {
            source,
            target,
            variable_counter: 0,
        }
    }

    /// Walks move and rename operations backwards to recover the name a
    /// table currently has on the server.
    fn source_table_name(
        operations: &[MigrationOperation],
        name: &SchemaQualifiedName,
    ) -> SchemaQualifiedName {
        let mut current = name.clone();
        for operation in operations.iter().rev() {
            match operation {
                MigrationOperation::RenameTable { name, new_name }
                    if name.schema == current.schema && *new_name == current.name =>
                {
                    current = name.clone();
                }
                MigrationOperation::MoveTable { name, new_schema }
                    if *new_schema == current.schema && name.name == current.name =>
                {
                    current = name.clone();
                }
                _ => {}
            }
        }
        current
    }

    /// Walks move and rename operations forwards to the name a table
    /// ends up with.
    fn target_table_name(
        operations: &[MigrationOperation],
        name: &SchemaQualifiedName,
    ) -> SchemaQualifiedName {
        let mut current = name.clone();
        for operation in operations {
            match operation {
                MigrationOperation::MoveTable { name, new_schema } if *name == current => {
                    current = SchemaQualifiedName::new(new_schema.clone(), name.name.clone());
                }
                MigrationOperation::RenameTable { name, new_name } if *name == current => {
                    current = SchemaQualifiedName::new(name.schema.clone(), new_name.clone());
                }
                _ => {}
            }
        }
        current
    }

    /// Walks column renames backwards to recover the name a column
    /// currently has on the server.
    fn source_column_name(
        operations: &[MigrationOperation],
        table: &SchemaQualifiedName,
        column: &str,
    ) -> String {
        let mut current = column.to_string();
        for operation in operations.iter().rev() {
            if let MigrationOperation::RenameColumn {
                table: rename_table,
                old_name,
                new_name,
            } = operation
            {
                if rename_table == table && *new_name == current {
                    current = old_name.clone();
                }
            }
        }
        current
    }

    /// Appends the operation unless an identical one is already queued.
    fn push_once(collection: &mut OperationCollection, operation: MigrationOperation) {
        if !collection.contains(&operation) {
            collection.push(operation);
        }
    }

    /// Emits the drops required before altering `column` on the source
    /// side: the primary key, every foreign key referencing the column,
    /// and its default constraint.
    fn synthesize_source_drops(
        &self,
        collection: &mut OperationCollection,
        table: &SchemaQualifiedName,
        source_table: &Table,
        source_column: &str,
    ) {
        if let Some(pk) = &source_table.primary_key {
            if pk.columns.iter().any(|c| c == source_column) {
                Self::push_once(
                    collection,
                    MigrationOperation::DropPrimaryKey {
                        table: table.clone(),
                        name: pk.name.clone(),
                    },
                );
            }
        }
        for other in &self.source.tables {
            for fk in &other.foreign_keys {
                let local_hit = fk.table == source_table.name
                    && fk.columns.iter().any(|c| c == source_column);
                let referenced_hit = fk.ref_table == source_table.name
                    && fk.ref_columns.iter().any(|c| c == source_column);
                if local_hit || referenced_hit {
                    Self::push_once(
                        collection,
                        MigrationOperation::DropForeignKey {
                            table: fk.table.clone(),
                            name: fk.name.clone(),
                        },
                    );
                }
            }
        }
        if let Some(column) = source_table.get_column(source_column) {
            if column.has_default() {
                Self::push_once(
                    collection,
                    MigrationOperation::DropDefaultConstraint {
                        table: table.clone(),
                        column_name: source_column.to_string(),
                    },
                );
            }
        }
    }

    /// Emits the re-adds required after altering `column` on the target
    /// side: the primary key and every foreign key referencing the
    /// column.
    fn synthesize_target_adds(
        &self,
        collection: &mut OperationCollection,
        table: &SchemaQualifiedName,
        target_table: &Table,
        target_column: &str,
    ) {
        if let Some(pk) = &target_table.primary_key {
            if pk.columns.iter().any(|c| c == target_column) {
                Self::push_once(
                    collection,
                    MigrationOperation::AddPrimaryKey {
                        table: table.clone(),
                        name: pk.name.clone(),
                        columns: pk.columns.clone(),
                        clustered: pk.clustered,
                    },
                );
            }
        }
        for other in &self.target.tables {
            for fk in &other.foreign_keys {
                let local_hit = fk.table == target_table.name
                    && fk.columns.iter().any(|c| c == target_column);
                let referenced_hit = fk.ref_table == target_table.name
                    && fk.ref_columns.iter().any(|c| c == target_column);
                if local_hit || referenced_hit {
                    Self::push_once(
                        collection,
                        MigrationOperation::AddForeignKey {
                            table: fk.table.clone(),
                            name: fk.name.clone(),
                            columns: fk.columns.clone(),
                            ref_table: fk.ref_table.clone(),
                            ref_columns: fk.ref_columns.clone(),
                            cascade_delete: fk.cascade_delete,
                        },
                    );
                }
            }
        }
    }
}

impl SqlGenerator for SqlServerGenerator {
    fn dialect(&self) -> &'static str {
        "sqlserver"
    }

    /// Rewrites the stream so every `AlterColumn` is framed by the
    /// drops and re-adds of the keys, foreign keys and default
    /// constraints its alteration invalidates, then re-flattens in
    /// canonical order.
    fn prepare(&mut self, operations: Vec<MigrationOperation>) -> Result<Vec<MigrationOperation>> {
        let alters: Vec<(SchemaQualifiedName, String)> = operations
            .iter()
            .filter_map(|operation| match operation {
                MigrationOperation::AlterColumn { table, column, .. } => {
                    Some((table.clone(), column.name.clone()))
                }
                _ => None,
            })
            .collect();
        if alters.is_empty() {
            return Ok(operations);
        }

        let mut collection = OperationCollection::new();
        collection.extend(operations.iter().cloned());

        for (table, column_name) in alters {
            let source_name = Self::source_table_name(&operations, &table);
            let target_name = Self::target_table_name(&operations, &table);
            let source_column = Self::source_column_name(&operations, &table, &column_name);
            // Rename operations already carry the final column name, so
            // the forward walk resolves to the name itself.
            let target_column = column_name.clone();
            debug!(
                table = %table,
                column = %column_name,
                source_table = %source_name,
                source_column = %source_column,
                "framing column alteration"
            );

            if let Some(source_table) = self.source.get_table(&source_name) {
                self.synthesize_source_drops(
                    &mut collection,
                    &table,
                    source_table,
                    &source_column,
                );
            }
            if let Some(target_table) = self.target.get_table(&target_name) {
                self.synthesize_target_adds(&mut collection, &table, target_table, &target_column);
            }
        }
        Ok(canonical_flatten(collection))
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn move_table(
        &mut self,
        name: &SchemaQualifiedName,
        new_schema: &str,
    ) -> Result<Option<SqlStatement>> {
        Ok(Some(SqlStatement::new(format!(
            "ALTER SCHEMA {} TRANSFER {}",
            self.quote_identifier(new_schema),
            self.quote_qualified(name)
        ))))
    }

    fn rename_table(
        &mut self,
        name: &SchemaQualifiedName,
        new_name: &str,
    ) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "EXECUTE sp_rename @objname = N{}, @newname = N{}, @objtype = N'OBJECT'",
            self.string_literal(&name.to_string()),
            self.string_literal(new_name)
        )))
    }

    fn rename_column(
        &mut self,
        table: &SchemaQualifiedName,
        old_name: &str,
        new_name: &str,
    ) -> Result<SqlStatement> {
        let objname = format!("{}.{}.{}", table.schema, table.name, old_name);
        Ok(SqlStatement::new(format!(
            "EXECUTE sp_rename @objname = N{}, @newname = N{}, @objtype = N'COLUMN'",
            self.string_literal(&objname),
            self.string_literal(new_name)
        )))
    }

    fn rename_index(
        &mut self,
        table: &SchemaQualifiedName,
        old_name: &str,
        new_name: &str,
    ) -> Result<SqlStatement> {
        let objname = format!("{}.{}.{}", table.schema, table.name, old_name);
        Ok(SqlStatement::new(format!(
            "EXECUTE sp_rename @objname = N{}, @newname = N{}, @objtype = N'INDEX'",
            self.string_literal(&objname),
            self.string_literal(new_name)
        )))
    }

    fn add_column(&mut self, table: &SchemaQualifiedName, column: &Column) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_qualified(table),
            self.column_definition(column, false)?
        )))
    }

    fn add_default_constraint(
        &mut self,
        table: &SchemaQualifiedName,
        column_name: &str,
        value: Option<&DefaultValue>,
        sql: Option<&str>,
    ) -> Result<SqlStatement> {
        let constraint = format!("DF_{}_{}", table.name, column_name);
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
            self.quote_qualified(table),
            self.quote_identifier(&constraint),
            self.default_expression(value, sql)?,
            self.quote_identifier(column_name)
        )))
    }

    /// The constraint carries a system-assigned name, so it is looked
    /// up from the catalog into a local variable and dropped
    /// dynamically.
    fn drop_default_constraint(
        &mut self,
        table: &SchemaQualifiedName,
        column_name: &str,
    ) -> Result<SqlStatement> {
        let variable = format!("@var{}", self.variable_counter);
        self.variable_counter += 1;

        let mut builder = SqlBuilder::new();
        builder.push_line(&format!("DECLARE {variable} nvarchar(128)"));
        builder.push_line(&format!("SELECT {variable} = name"));
        builder.push_line("FROM sys.default_constraints");
        builder.push_line(&format!(
            "WHERE parent_object_id = object_id(N{})",
            self.string_literal(&table.to_string())
        ));
        builder.push_line(&format!(
            "AND col_name(parent_object_id, parent_column_id) = {};",
            self.string_literal(column_name)
        ));
        builder.push_line(&format!("IF {variable} IS NOT NULL"));
        builder.indent();
        builder.push_line(&format!(
            "EXECUTE('ALTER TABLE {} DROP CONSTRAINT \"' + {variable} + '\"')",
            self.quote_qualified(table)
        ));
        Ok(SqlStatement::new(builder.finish()))
    }

    fn drop_index(&mut self, table: &SchemaQualifiedName, name: &str) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(name),
            self.quote_qualified(table)
        )))
    }

    fn column_traits(&self, column: &Column) -> Option<String> {
        (column.value_generation == ValueGeneration::OnInsert).then(|| " IDENTITY".to_string())
    }

    fn primary_key_traits(&self, clustered: bool) -> Option<String> {
        (!clustered).then(|| " NONCLUSTERED".to_string())
    }

    fn index_traits(&self, clustered: bool) -> Option<String> {
        clustered.then(|| "CLUSTERED ".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::OperationKind;
    use crate::schema::{ForeignKey, PrimaryKey};

    fn qname(schema: &str, name: &str) -> SchemaQualifiedName {
        SchemaQualifiedName::new(schema, name)
    }

    fn empty() -> SqlServerGenerator {
        SqlServerGenerator::new(DatabaseModel::new(), DatabaseModel::new())
    }

    fn keyed_table(pk_column: &str, nullable: bool) -> Table {
        let mut column = Column::new(pk_column, "int", "int");
        if !nullable {
            column = column.not_null();
        }
        Table::new(qname("dbo", "T"))
            .column(column)
            .primary_key(PrimaryKey::new(
                "PK_T",
                qname("dbo", "T"),
                vec![pk_column.to_string()],
            ))
    }

    #[test]
    fn identifier_quoting_uses_brackets() {
        let g = empty();
        assert_eq!(g.quote_identifier("Users"), "[Users]");
        assert_eq!(g.quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn rename_column_uses_sp_rename() {
        let statement = empty()
            .rename_column(&qname("dbo", "T"), "Foo", "Bar")
            .unwrap();
        assert_eq!(
            statement.text,
            "EXECUTE sp_rename @objname = N'dbo.T.Foo', @newname = N'Bar', @objtype = N'COLUMN'"
        );
    }

    #[test]
    fn rename_table_uses_sp_rename() {
        let statement = empty().rename_table(&qname("dbo", "Old"), "New").unwrap();
        assert_eq!(
            statement.text,
            "EXECUTE sp_rename @objname = N'dbo.Old', @newname = N'New', @objtype = N'OBJECT'"
        );
    }

    #[test]
    fn rename_index_uses_sp_rename() {
        let statement = empty()
            .rename_index(&qname("dbo", "T"), "IX_Old", "IX_New")
            .unwrap();
        assert_eq!(
            statement.text,
            "EXECUTE sp_rename @objname = N'dbo.T.IX_Old', @newname = N'IX_New', @objtype = N'INDEX'"
        );
    }

    #[test]
    fn move_table_transfers_schema() {
        let statement = empty()
            .move_table(&qname("src", "T"), "dst")
            .unwrap()
            .unwrap();
        assert_eq!(statement.text, "ALTER SCHEMA [dst] TRANSFER [src].[T]");
    }

    #[test]
    fn add_default_constraint_names_the_constraint() {
        let statement = empty()
            .add_default_constraint(
                &qname("dbo", "T"),
                "Y",
                Some(&DefaultValue::Integer(0)),
                None,
            )
            .unwrap();
        assert_eq!(
            statement.text,
            "ALTER TABLE [dbo].[T] ADD CONSTRAINT [DF_T_Y] DEFAULT 0 FOR [Y]"
        );
    }

    #[test]
    fn drop_default_constraint_discovers_the_name() {
        let mut g = empty();
        let statement = g.drop_default_constraint(&qname("dbo", "T"), "X").unwrap();
        assert_eq!(
            statement.text,
            "DECLARE @var0 nvarchar(128)\n\
             SELECT @var0 = name\n\
             FROM sys.default_constraints\n\
             WHERE parent_object_id = object_id(N'dbo.T')\n\
             AND col_name(parent_object_id, parent_column_id) = 'X';\n\
             IF @var0 IS NOT NULL\n\
             \x20   EXECUTE('ALTER TABLE [dbo].[T] DROP CONSTRAINT \"' + @var0 + '\"')"
        );

        // The variable counter is per instance.
        let statement = g.drop_default_constraint(&qname("dbo", "T"), "Y").unwrap();
        assert!(statement.text.starts_with("DECLARE @var1 nvarchar(128)"));
    }

    #[test]
    fn drop_index_names_the_table() {
        let statement = empty().drop_index(&qname("dbo", "T"), "IX_T_A").unwrap();
        assert_eq!(statement.text, "DROP INDEX [IX_T_A] ON [dbo].[T]");
    }

    #[test]
    fn identity_trait_is_applied() {
        let column = Column::new("Id", "int", "int")
            .not_null()
            .generated_on_insert();
        let definition = empty().column_definition(&column, false).unwrap();
        assert_eq!(definition, "[Id] int NOT NULL IDENTITY");
    }

    #[test]
    fn nonclustered_primary_key_trait() {
        let statement = empty()
            .add_primary_key(&qname("dbo", "T"), "PK_T", &["Id".to_string()], false)
            .unwrap();
        assert_eq!(
            statement.text,
            "ALTER TABLE [dbo].[T] ADD CONSTRAINT [PK_T] PRIMARY KEY NONCLUSTERED ([Id])"
        );
    }

    #[test]
    fn clustered_index_keyword() {
        let statement = empty()
            .create_index(&qname("dbo", "T"), "IX_T", &["A".to_string()], false, true)
            .unwrap();
        assert_eq!(statement.text, "CREATE CLUSTERED INDEX [IX_T] ON [dbo].[T] ([A])");
    }

    #[test]
    fn add_column_omits_the_column_keyword() {
        let statement = empty()
            .add_column(&qname("dbo", "T"), &Column::new("Y", "int", "int").not_null())
            .unwrap();
        assert_eq!(statement.text, "ALTER TABLE [dbo].[T] ADD [Y] int NOT NULL");
    }

    #[test]
    fn altering_a_key_column_frames_the_alteration() {
        let source = DatabaseModel::new().table(keyed_table("Id", true));
        let target = DatabaseModel::new().table(keyed_table("Id", false));
        let mut g = SqlServerGenerator::new(source, target);

        let operations = vec![MigrationOperation::AlterColumn {
            table: qname("dbo", "T"),
            column: Column::new("Id", "int", "int").not_null(),
            destructive: true,
        }];
        let prepared = g.prepare(operations).unwrap();

        assert_eq!(
            prepared.iter().map(MigrationOperation::kind).collect::<Vec<_>>(),
            vec![
                OperationKind::DropPrimaryKey,
                OperationKind::AlterColumn,
                OperationKind::AddPrimaryKey,
            ]
        );
        assert!(matches!(
            &prepared[0],
            MigrationOperation::DropPrimaryKey { name, .. } if name == "PK_T"
        ));
        assert!(matches!(
            &prepared[2],
            MigrationOperation::AddPrimaryKey { name, columns, clustered: true, .. }
                if name == "PK_T" && columns == &["Id".to_string()]
        ));
    }

    #[test]
    fn altering_a_referenced_column_reframes_foreign_keys() {
        let users = || {
            Table::new(qname("dbo", "Users"))
                .column(Column::new("Id", "int", "int").not_null())
                .primary_key(PrimaryKey::new(
                    "PK_Users",
                    qname("dbo", "Users"),
                    vec!["Id".to_string()],
                ))
        };
        let posts = |cascade: bool| {
            let mut fk = ForeignKey::new(
                "FK_Posts_Users",
                qname("dbo", "Posts"),
                vec!["AuthorId".to_string()],
                qname("dbo", "Users"),
                vec!["Id".to_string()],
            );
            if cascade {
                fk = fk.cascade_delete();
            }
            Table::new(qname("dbo", "Posts"))
                .column(Column::new("AuthorId", "int", "int").not_null())
                .foreign_key(fk)
        };
        let source = DatabaseModel::new().table(users()).table(posts(false));
        let target = DatabaseModel::new().table(users()).table(posts(true));
        let mut g = SqlServerGenerator::new(source, target);

        let operations = vec![MigrationOperation::AlterColumn {
            table: qname("dbo", "Users"),
            column: Column::new("Id", "bigint", "bigint").not_null(),
            destructive: true,
        }];
        let prepared = g.prepare(operations).unwrap();

        let kinds: Vec<OperationKind> =
            prepared.iter().map(MigrationOperation::kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::DropForeignKey,
                OperationKind::DropPrimaryKey,
                OperationKind::AlterColumn,
                OperationKind::AddPrimaryKey,
                OperationKind::AddForeignKey,
            ]
        );
        assert!(matches!(
            &prepared[0],
            MigrationOperation::DropForeignKey { table, name }
                if *table == qname("dbo", "Posts") && name == "FK_Posts_Users"
        ));
        assert!(matches!(
            &prepared[4],
            MigrationOperation::AddForeignKey { cascade_delete: true, .. }
        ));
    }

    #[test]
    fn source_names_are_recovered_through_renames_and_moves() {
        let source_table = Table::new(qname("src", "Old"))
            .column(
                Column::new("OldCol", "int", "int").default_value(DefaultValue::Integer(1)),
            );
        let source = DatabaseModel::new().table(source_table);
        let target = DatabaseModel::new().table(
            Table::new(qname("dst", "New")).column(Column::new("NewCol", "int", "int")),
        );
        let mut g = SqlServerGenerator::new(source, target);

        let operations = vec![
            MigrationOperation::MoveTable {
                name: qname("src", "Old"),
                new_schema: "dst".to_string(),
            },
            MigrationOperation::RenameTable {
                name: qname("dst", "Old"),
                new_name: "New".to_string(),
            },
            MigrationOperation::RenameColumn {
                table: qname("dst", "New"),
                old_name: "OldCol".to_string(),
                new_name: "NewCol".to_string(),
            },
            MigrationOperation::AlterColumn {
                table: qname("dst", "New"),
                column: Column::new("NewCol", "int", "bigint"),
                destructive: true,
            },
        ];
        let prepared = g.prepare(operations).unwrap();

        // The default constraint of the source-side column is dropped,
        // discovered under the source column name.
        assert!(prepared.iter().any(|operation| matches!(
            operation,
            MigrationOperation::DropDefaultConstraint { table, column_name }
                if *table == qname("dst", "New") && column_name == "OldCol"
        )));
    }

    #[test]
    fn prepare_does_not_duplicate_existing_drops() {
        let source = DatabaseModel::new().table(keyed_table("Id", true));
        let target = DatabaseModel::new().table(keyed_table("Id", false));
        let mut g = SqlServerGenerator::new(source, target);

        let operations = vec![
            MigrationOperation::DropPrimaryKey {
                table: qname("dbo", "T"),
                name: "PK_T".to_string(),
            },
            MigrationOperation::AlterColumn {
                table: qname("dbo", "T"),
                column: Column::new("Id", "int", "int").not_null(),
                destructive: true,
            },
        ];
        let prepared = g.prepare(operations).unwrap();

        let drops = prepared
            .iter()
            .filter(|operation| operation.kind() == OperationKind::DropPrimaryKey)
            .count();
        assert_eq!(drops, 1);
    }
}
