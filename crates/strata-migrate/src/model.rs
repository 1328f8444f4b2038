//! Entity-level model.
//!
//! The matcher pairs entity types and properties before anything is
//! compared at the database level, because property names and explicit
//! column-name annotations carry intent that the projected snapshot
//! loses. [`EntityModel::to_database`] projects a model into the
//! [`DatabaseModel`] snapshot the differ and generators work with.

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::schema::{
    Column, DatabaseModel, DefaultValue, ForeignKey, Index, PrimaryKey, SchemaQualifiedName,
    Sequence, SourceType, Table, ValueGeneration,
};

/// A property of an entity type, backing one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Identity of the source type.
    pub source_type: SourceType,
    /// Explicitly annotated column name, if any. When absent the
    /// property name is used as the column name.
    pub column_name: Option<String>,
    /// Physical store type.
    pub data_type: String,
    /// Whether the column allows NULL.
    pub nullable: bool,
    /// Store value generation strategy.
    pub value_generation: ValueGeneration,
    /// Whether this is a row-version column.
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

impl Property {
    /// Creates a nullable property.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_type: SourceType::new(source_type),
            column_name: None,
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

    /// Annotates the backing column name.
    #[must_use]
    pub fn mapped_to(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    /// Marks the property NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the value as generated on insert.
    #[must_use]
    pub fn generated_on_insert(mut self) -> Self {
        self.value_generation = ValueGeneration::OnInsert;
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub fn max_length(mut self, length: u32) -> Self {
        self.max_length = Some(length);
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

    /// The name of the backing column.
    #[must_use]
    pub fn effective_column_name(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.name)
    }

    /// Projects this property into a column.
    #[must_use]
    pub fn to_column(&self) -> Column {
        Column {
            name: self.effective_column_name().to_string(),
            source_type: self.source_type.clone(),
            data_type: self.data_type.clone(),
            nullable: self.nullable,
            value_generation: self.value_generation,
            timestamp: self.timestamp,
            max_length: self.max_length,
            precision: self.precision,
            scale: self.scale,
            fixed_length: self.fixed_length,
            unicode: self.unicode,
            default_value: self.default_value.clone(),
            default_sql: self.default_sql.clone(),
        }
    }
}

/// An entity type's primary key, in property terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKey {
    /// Constraint name.
    pub name: String,
    /// Key properties, in order.
    pub properties: Vec<String>,
    /// Whether the key backs a clustered index.
    pub clustered: bool,
}

impl EntityKey {
    /// Creates a clustered key.
    #[must_use]
    pub fn new(name: impl Into<String>, properties: Vec<String>) -> Self {
        Self {
            name: name.into(),
            properties,
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

/// A foreign key in property terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityForeignKey {
    /// Constraint name.
    pub name: String,
    /// Referencing properties, in order.
    pub properties: Vec<String>,
    /// Referenced entity type name.
    pub ref_entity: String,
    /// Referenced properties, same length as `properties`.
    pub ref_properties: Vec<String>,
    /// Whether deletes cascade.
    pub cascade_delete: bool,
    /// Whether the relationship is one-to-one.
    pub unique: bool,
    /// Whether the referencing side is required.
    pub required: bool,
}

impl EntityForeignKey {
    /// Creates a required, non-cascading foreign key.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        properties: Vec<String>,
        ref_entity: impl Into<String>,
        ref_properties: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            properties,
            ref_entity: ref_entity.into(),
            ref_properties,
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

/// An index in property terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIndex {
    /// Index name.
    pub name: String,
    /// Indexed properties, in order.
    pub properties: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Whether the index is clustered.
    pub clustered: bool,
}

impl EntityIndex {
    /// Creates a non-unique, nonclustered index.
    #[must_use]
    pub fn new(name: impl Into<String>, properties: Vec<String>) -> Self {
        Self {
            name: name.into(),
            properties,
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

/// An entity type and its mapping to a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    /// Entity type name.
    pub name: String,
    /// Target schema.
    pub schema: String,
    /// Target table name.
    pub table: String,
    /// Properties, in declaration order.
    pub properties: Vec<Property>,
    /// Primary key, if any.
    pub key: Option<EntityKey>,
    /// Foreign keys, in declaration order.
    pub foreign_keys: Vec<EntityForeignKey>,
    /// Indexes, in declaration order.
    pub indexes: Vec<EntityIndex>,
}

impl EntityType {
    /// Creates an entity type mapped to `schema.table`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            table: table.into(),
            properties: Vec::new(),
            key: None,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub fn key(mut self, key: EntityKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, foreign_key: EntityForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: EntityIndex) -> Self {
        self.indexes.push(index);
        self
    }

    /// The table this entity maps to.
    #[must_use]
    pub fn table_name(&self) -> SchemaQualifiedName {
        SchemaQualifiedName::new(self.schema.clone(), self.table.clone())
    }

    /// Gets a property by name.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// A complete entity model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityModel {
    /// Entity types, in declaration order.
    pub entities: Vec<EntityType>,
    /// Sequences, carried through to the database snapshot unchanged.
    pub sequences: Vec<Sequence>,
}

impl EntityModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity type.
    #[must_use]
    pub fn entity(mut self, entity: EntityType) -> Self {
        self.entities.push(entity);
        self
    }

    /// Adds a sequence.
    #[must_use]
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    /// Gets an entity type by name.
    #[must_use]
    pub fn get_entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Projects the entity model into a database snapshot.
    ///
    /// Property references in keys, foreign keys and indexes are
    /// resolved to column names; a reference to a missing property or
    /// entity type is an [`MigrateError::InvariantViolation`].
    pub fn to_database(&self) -> Result<DatabaseModel> {
        let mut database = DatabaseModel::new();
        for entity in &self.entities {
            let table_name = entity.table_name();
            let mut table = Table::new(table_name.clone());
            for property in &entity.properties {
                table = table.column(property.to_column());
            }
            if let Some(key) = &entity.key {
                let columns = Self::resolve_columns(entity, &key.properties)?;
                let mut primary_key = PrimaryKey::new(&key.name, table_name.clone(), columns);
                primary_key.clustered = key.clustered;
                table = table.primary_key(primary_key);
            }
            for foreign_key in &entity.foreign_keys {
                let columns = Self::resolve_columns(entity, &foreign_key.properties)?;
                let ref_entity = self.get_entity(&foreign_key.ref_entity).ok_or_else(|| {
                    MigrateError::InvariantViolation(format!(
                        "foreign key '{}' on '{}' references missing entity '{}'",
                        foreign_key.name, entity.name, foreign_key.ref_entity
                    ))
                })?;
                let ref_columns = Self::resolve_columns(ref_entity, &foreign_key.ref_properties)?;
                let mut fk = ForeignKey::new(
                    &foreign_key.name,
                    table_name.clone(),
                    columns,
                    ref_entity.table_name(),
                    ref_columns,
                );
                fk.cascade_delete = foreign_key.cascade_delete;
                fk.unique = foreign_key.unique;
                fk.required = foreign_key.required;
                table = table.foreign_key(fk);
            }
            for index in &entity.indexes {
                let columns = Self::resolve_columns(entity, &index.properties)?;
                let mut idx = Index::new(&index.name, table_name.clone(), columns);
                idx.unique = index.unique;
                idx.clustered = index.clustered;
                table = table.index(idx);
            }
            database = database.table(table);
        }
        for sequence in &self.sequences {
            database = database.sequence(sequence.clone());
        }
        Ok(database)
    }

    fn resolve_columns(entity: &EntityType, properties: &[String]) -> Result<Vec<String>> {
        properties
            .iter()
            .map(|name| {
                entity
                    .get_property(name)
                    .map(|p| p.effective_column_name().to_string())
                    .ok_or_else(|| {
                        MigrateError::InvariantViolation(format!(
                            "entity '{}' has no property '{name}'",
                            entity.name
                        ))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_entity() -> EntityType {
        EntityType::new("User", "dbo", "Users")
            .property(Property::new("Id", "int", "int").not_null())
            .property(
                Property::new("DisplayName", "string", "nvarchar")
                    .mapped_to("display_name")
                    .max_length(255),
            )
            .key(EntityKey::new("PK_Users", vec!["Id".to_string()]))
    }

    #[test]
    fn projection_applies_column_annotation() {
        let model = EntityModel::new().entity(user_entity());
        let database = model.to_database().unwrap();

        let table = database
            .get_table(&SchemaQualifiedName::new("dbo", "Users"))
            .unwrap();
        assert!(table.get_column("display_name").is_some());
        assert!(table.get_column("DisplayName").is_none());
    }

    #[test]
    fn projection_resolves_key_properties() {
        let model = EntityModel::new().entity(user_entity());
        let database = model.to_database().unwrap();

        let table = database
            .get_table(&SchemaQualifiedName::new("dbo", "Users"))
            .unwrap();
        let primary_key = table.primary_key.as_ref().unwrap();
        assert_eq!(primary_key.name, "PK_Users");
        assert_eq!(primary_key.columns, vec!["Id"]);
        assert!(primary_key.clustered);
    }

    #[test]
    fn projection_resolves_foreign_keys_across_entities() {
        let post = EntityType::new("Post", "dbo", "Posts")
            .property(Property::new("Id", "int", "int").not_null())
            .property(Property::new("AuthorId", "int", "int").not_null())
            .foreign_key(
                EntityForeignKey::new(
                    "FK_Posts_Users",
                    vec!["AuthorId".to_string()],
                    "User",
                    vec!["Id".to_string()],
                )
                .cascade_delete(),
            );
        let model = EntityModel::new().entity(user_entity()).entity(post);
        let database = model.to_database().unwrap();

        let table = database
            .get_table(&SchemaQualifiedName::new("dbo", "Posts"))
            .unwrap();
        let fk = &table.foreign_keys[0];
        assert_eq!(fk.ref_table, SchemaQualifiedName::new("dbo", "Users"));
        assert_eq!(fk.ref_columns, vec!["Id"]);
        assert!(fk.cascade_delete);
    }

    #[test]
    fn projection_rejects_missing_referenced_entity() {
        let post = EntityType::new("Post", "dbo", "Posts")
            .property(Property::new("AuthorId", "int", "int"))
            .foreign_key(EntityForeignKey::new(
                "FK_Posts_Users",
                vec!["AuthorId".to_string()],
                "User",
                vec!["Id".to_string()],
            ));
        let model = EntityModel::new().entity(post);

        let err = model.to_database().unwrap_err();
        assert!(matches!(err, MigrateError::InvariantViolation(_)));
    }

    #[test]
    fn projection_rejects_missing_property() {
        let entity = EntityType::new("User", "dbo", "Users")
            .property(Property::new("Id", "int", "int"))
            .key(EntityKey::new("PK_Users", vec!["Missing".to_string()]));
        let model = EntityModel::new().entity(entity);

        assert!(model.to_database().is_err());
    }
}
