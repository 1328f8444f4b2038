//! Dialect-aware SQL generation.
//!
//! [`SqlGenerator`] is one visitor method per operation with default
//! (dialect-neutral) renderings; a dialect overrides the visitors and
//! vocabulary hooks it needs. The base dialect delimits identifiers
//! with double quotes, emits nothing for [`MigrationOperation::MoveTable`]
//! and rejects renames, which have no portable SQL form.
//!
//! A generator instance is stateful and not reentrant; construct a
//! fresh one per generation request.

mod sqlserver;

pub use sqlserver::SqlServerGenerator;

use crate::builder::SqlBuilder;
use crate::error::{MigrateError, Result};
use crate::operations::MigrationOperation;
use crate::schema::{Column, DatabaseModel, DefaultValue, SchemaQualifiedName, Sequence, Table};

/// A generated SQL statement with its parameters.
///
/// Most statements carry no parameters; the list exists for dialects
/// whose statements bind values at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// Statement text.
    pub text: String,
    /// Positional parameter values.
    pub parameters: Vec<String>,
}

impl SqlStatement {
    /// Creates a statement without parameters.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }
}

/// Supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Dialect-neutral rendering.
    Generic,
    /// Microsoft SQL Server.
    SqlServer,
}

/// Creates a generator for the dialect, resolved against the given
/// source and target database snapshots.
#[must_use]
pub fn create(
    dialect: Dialect,
    source: DatabaseModel,
    target: DatabaseModel,
) -> Box<dyn SqlGenerator> {
    match dialect {
        Dialect::Generic => Box::new(GenericSqlGenerator::new()),
        Dialect::SqlServer => Box::new(SqlServerGenerator::new(source, target)),
    }
}

/// Renders migration operations as dialect-specific SQL.
pub trait SqlGenerator {
    /// Returns the dialect name.
    fn dialect(&self) -> &'static str;

    /// Rewrites the operation stream before rendering. The base
    /// implementation returns it unchanged.
    fn prepare(&mut self, operations: Vec<MigrationOperation>) -> Result<Vec<MigrationOperation>> {
        Ok(operations)
    }

    /// Renders an ordered operation stream into ordered statements.
    fn generate(&mut self, operations: &[MigrationOperation]) -> Result<Vec<SqlStatement>> {
        let prepared = self.prepare(operations.to_vec())?;
        let mut statements = Vec::with_capacity(prepared.len());
        for operation in &prepared {
            if let Some(statement) = self.generate_operation(operation)? {
                statements.push(statement);
            }
        }
        Ok(statements)
    }

    /// Dispatches one operation to its visitor. Returns `None` when the
    /// dialect intentionally emits nothing for the operation.
    fn generate_operation(
        &mut self,
        operation: &MigrationOperation,
    ) -> Result<Option<SqlStatement>> {
        match operation {
            MigrationOperation::CreateTable { table } => self.create_table(table).map(Some),
            MigrationOperation::DropTable { name } => self.drop_table(name).map(Some),
            MigrationOperation::MoveTable { name, new_schema } => {
                self.move_table(name, new_schema)
            }
            MigrationOperation::RenameTable { name, new_name } => {
                self.rename_table(name, new_name).map(Some)
            }
            MigrationOperation::AddColumn { table, column } => {
                self.add_column(table, column).map(Some)
            }
            MigrationOperation::DropColumn { table, column_name } => {
                self.drop_column(table, column_name).map(Some)
            }
            MigrationOperation::AlterColumn {
                table,
                column,
                destructive,
            } => self.alter_column(table, column, *destructive).map(Some),
            MigrationOperation::RenameColumn {
                table,
                old_name,
                new_name,
            } => self.rename_column(table, old_name, new_name).map(Some),
            MigrationOperation::AddPrimaryKey {
                table,
                name,
                columns,
                clustered,
            } => self
                .add_primary_key(table, name, columns, *clustered)
                .map(Some),
            MigrationOperation::DropPrimaryKey { table, name } => {
                self.drop_primary_key(table, name).map(Some)
            }
            MigrationOperation::AddForeignKey {
                table,
                name,
                columns,
                ref_table,
                ref_columns,
                cascade_delete,
            } => self
                .add_foreign_key(table, name, columns, ref_table, ref_columns, *cascade_delete)
                .map(Some),
            MigrationOperation::DropForeignKey { table, name } => {
                self.drop_foreign_key(table, name).map(Some)
            }
            MigrationOperation::AddDefaultConstraint {
                table,
                column_name,
                value,
                sql,
            } => self
                .add_default_constraint(table, column_name, value.as_ref(), sql.as_deref())
                .map(Some),
            MigrationOperation::DropDefaultConstraint { table, column_name } => {
                self.drop_default_constraint(table, column_name).map(Some)
            }
            MigrationOperation::CreateIndex {
                table,
                name,
                columns,
                unique,
                clustered,
            } => self
                .create_index(table, name, columns, *unique, *clustered)
                .map(Some),
            MigrationOperation::DropIndex { table, name } => {
                self.drop_index(table, name).map(Some)
            }
            MigrationOperation::RenameIndex {
                table,
                old_name,
                new_name,
            } => self.rename_index(table, old_name, new_name).map(Some),
            MigrationOperation::CreateSequence { sequence } => {
                self.create_sequence(sequence).map(Some)
            }
            MigrationOperation::DropSequence { name } => self.drop_sequence(name).map(Some),
        }
    }

    /// Renders CREATE TABLE with columns and an inline primary key.
    /// Foreign keys and indexes arrive as separate operations.
    fn create_table(&mut self, table: &Table) -> Result<SqlStatement> {
        let mut body = Vec::with_capacity(table.columns.len() + 1);
        for column in &table.columns {
            body.push(self.column_definition(column, true)?);
        }
        if let Some(pk) = &table.primary_key {
            body.push(format!(
                "CONSTRAINT {} PRIMARY KEY{} ({})",
                self.quote_identifier(&pk.name),
                self.primary_key_traits(pk.clustered).unwrap_or_default(),
                self.column_list(&pk.columns),
            ));
        }

        let mut builder = SqlBuilder::new();
        builder.push_line(&format!(
            "CREATE TABLE {} (",
            self.quote_qualified(&table.name)
        ));
        builder.indent();
        let count = body.len();
        for (i, part) in body.into_iter().enumerate() {
            let separator = if i + 1 < count { "," } else { "" };
            builder.push_line(&format!("{part}{separator}"));
        }
        builder.unindent();
        builder.push_line(")");
        Ok(SqlStatement::new(builder.finish()))
    }

    /// Renders DROP TABLE.
    fn drop_table(&mut self, name: &SchemaQualifiedName) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "DROP TABLE {}",
            self.quote_qualified(name)
        )))
    }

    /// Renders a schema move. The base dialect emits nothing.
    fn move_table(
        &mut self,
        _name: &SchemaQualifiedName,
        _new_schema: &str,
    ) -> Result<Option<SqlStatement>> {
        Ok(None)
    }

    /// Renders a table rename. The base dialect has no portable form.
    fn rename_table(
        &mut self,
        _name: &SchemaQualifiedName,
        _new_name: &str,
    ) -> Result<SqlStatement> {
        Err(MigrateError::UnsupportedDialect {
            dialect: self.dialect(),
            operation: "RenameTable",
        })
    }

    /// Renders ADD COLUMN.
    fn add_column(&mut self, table: &SchemaQualifiedName, column: &Column) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_qualified(table),
            self.column_definition(column, false)?
        )))
    }

    /// Renders DROP COLUMN.
    fn drop_column(
        &mut self,
        table: &SchemaQualifiedName,
        column_name: &str,
    ) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_qualified(table),
            self.quote_identifier(column_name)
        )))
    }

    /// Renders ALTER COLUMN to the new definition.
    fn alter_column(
        &mut self,
        table: &SchemaQualifiedName,
        column: &Column,
        _destructive: bool,
    ) -> Result<SqlStatement> {
        let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} ALTER COLUMN {} {} {}",
            self.quote_qualified(table),
            self.quote_identifier(&column.name),
            self.data_type(column),
            nullability
        )))
    }

    /// Renders a column rename. The base dialect has no portable form.
    fn rename_column(
        &mut self,
        _table: &SchemaQualifiedName,
        _old_name: &str,
        _new_name: &str,
    ) -> Result<SqlStatement> {
        Err(MigrateError::UnsupportedDialect {
            dialect: self.dialect(),
            operation: "RenameColumn",
        })
    }

    /// Renders ADD CONSTRAINT ... PRIMARY KEY.
    fn add_primary_key(
        &mut self,
        table: &SchemaQualifiedName,
        name: &str,
        columns: &[String],
        clustered: bool,
    ) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY{} ({})",
            self.quote_qualified(table),
            self.quote_identifier(name),
            self.primary_key_traits(clustered).unwrap_or_default(),
            self.column_list(columns)
        )))
    }

    /// Renders DROP CONSTRAINT for a primary key.
    fn drop_primary_key(
        &mut self,
        table: &SchemaQualifiedName,
        name: &str,
    ) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_qualified(table),
            self.quote_identifier(name)
        )))
    }

    /// Renders ADD CONSTRAINT ... FOREIGN KEY.
    fn add_foreign_key(
        &mut self,
        table: &SchemaQualifiedName,
        name: &str,
        columns: &[String],
        ref_table: &SchemaQualifiedName,
        ref_columns: &[String],
        cascade_delete: bool,
    ) -> Result<SqlStatement> {
        let cascade = if cascade_delete {
            " ON DELETE CASCADE"
        } else {
            ""
        };
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}){}",
            self.quote_qualified(table),
            self.quote_identifier(name),
            self.column_list(columns),
            self.quote_qualified(ref_table),
            self.column_list(ref_columns),
            cascade
        )))
    }

    /// Renders DROP CONSTRAINT for a foreign key.
    fn drop_foreign_key(
        &mut self,
        table: &SchemaQualifiedName,
        name: &str,
    ) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_qualified(table),
            self.quote_identifier(name)
        )))
    }

    /// Renders a default-constraint addition.
    fn add_default_constraint(
        &mut self,
        table: &SchemaQualifiedName,
        column_name: &str,
        value: Option<&DefaultValue>,
        sql: Option<&str>,
    ) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
            self.quote_qualified(table),
            self.quote_identifier(column_name),
            self.default_expression(value, sql)?
        )))
    }

    /// Renders a default-constraint drop.
    fn drop_default_constraint(
        &mut self,
        table: &SchemaQualifiedName,
        column_name: &str,
    ) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
            self.quote_qualified(table),
            self.quote_identifier(column_name)
        )))
    }

    /// Renders CREATE INDEX.
    fn create_index(
        &mut self,
        table: &SchemaQualifiedName,
        name: &str,
        columns: &[String],
        unique: bool,
        clustered: bool,
    ) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "CREATE {}{}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.index_traits(clustered).unwrap_or_default(),
            self.quote_identifier(name),
            self.quote_qualified(table),
            self.column_list(columns)
        )))
    }

    /// Renders DROP INDEX.
    fn drop_index(&mut self, _table: &SchemaQualifiedName, name: &str) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "DROP INDEX {}",
            self.quote_identifier(name)
        )))
    }

    /// Renders an index rename. The base dialect has no portable form.
    fn rename_index(
        &mut self,
        _table: &SchemaQualifiedName,
        _old_name: &str,
        _new_name: &str,
    ) -> Result<SqlStatement> {
        Err(MigrateError::UnsupportedDialect {
            dialect: self.dialect(),
            operation: "RenameIndex",
        })
    }

    /// Renders CREATE SEQUENCE.
    fn create_sequence(&mut self, sequence: &Sequence) -> Result<SqlStatement> {
        let mut text = format!("CREATE SEQUENCE {}", self.quote_qualified(&sequence.name));
        if let Some(data_type) = &sequence.data_type {
            text.push_str(&format!(" AS {data_type}"));
        }
        text.push_str(&format!(
            " START WITH {} INCREMENT BY {}",
            sequence.start_value, sequence.increment_by
        ));
        Ok(SqlStatement::new(text))
    }

    /// Renders DROP SEQUENCE.
    fn drop_sequence(&mut self, name: &SchemaQualifiedName) -> Result<SqlStatement> {
        Ok(SqlStatement::new(format!(
            "DROP SEQUENCE {}",
            self.quote_qualified(name)
        )))
    }

    /// Delimits an identifier. The base delimiter is double quotes with
    /// `""` escaping.
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Delimits a qualified name as `schema.name`, each part quoted.
    fn quote_qualified(&self, name: &SchemaQualifiedName) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(&name.schema),
            self.quote_identifier(&name.name)
        )
    }

    /// Delimits a string literal with single quotes and `''` escaping.
    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Renders a comma-separated quoted column list.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders the store type of a column, applying length or
    /// precision facets.
    fn data_type(&self, column: &Column) -> String {
        let mut data_type = column.data_type.clone();
        if let Some(max_length) = column.max_length {
            data_type.push_str(&format!("({max_length})"));
        } else if let Some(precision) = column.precision {
            match column.scale {
                Some(scale) => data_type.push_str(&format!("({precision}, {scale})")),
                None => data_type.push_str(&format!("({precision})")),
            }
        }
        data_type
    }

    /// Renders a full column definition. Defaults are only rendered
    /// inline when `include_default` is set (CREATE TABLE); elsewhere
    /// they travel as separate default-constraint operations.
    fn column_definition(&self, column: &Column, include_default: bool) -> Result<String> {
        let mut definition = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.data_type(column)
        );
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        if let Some(traits) = self.column_traits(column) {
            definition.push_str(&traits);
        }
        if include_default && column.has_default() {
            definition.push_str(" DEFAULT ");
            definition.push_str(&self.default_expression(
                column.default_value.as_ref(),
                column.default_sql.as_deref(),
            )?);
        }
        Ok(definition)
    }

    /// Extra clauses for a column (e.g. identity). Base: none.
    fn column_traits(&self, _column: &Column) -> Option<String> {
        None
    }

    /// Extra clauses for a primary key (e.g. clustering). Base: none.
    fn primary_key_traits(&self, _clustered: bool) -> Option<String> {
        None
    }

    /// Extra keywords for an index (e.g. clustering). Base: none.
    fn index_traits(&self, _clustered: bool) -> Option<String> {
        None
    }

    /// Renders a default as SQL: the literal value when present,
    /// otherwise the raw SQL expression.
    fn default_expression(
        &self,
        value: Option<&DefaultValue>,
        sql: Option<&str>,
    ) -> Result<String> {
        if let Some(value) = value {
            return Ok(value.to_sql());
        }
        if let Some(sql) = sql {
            return Ok(sql.to_string());
        }
        Err(MigrateError::UnhandledOperation(
            "default constraint carries neither a value nor a SQL expression".to_string(),
        ))
    }
}

/// The dialect-neutral generator.
#[derive(Debug, Default)]
pub struct GenericSqlGenerator;

impl GenericSqlGenerator {
    /// Creates a generic generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SqlGenerator for GenericSqlGenerator {
    fn dialect(&self) -> &'static str {
        "generic"
    }
}
