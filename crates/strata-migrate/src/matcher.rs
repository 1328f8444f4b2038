//! Two-tier pairing of model objects between two snapshots.
//!
//! Entities and properties are paired by exact name first, then by
//! structural similarity. The resulting pairings are translated through
//! the model-to-database mapping and re-validated against the stricter
//! database-level predicates before the differ consumes them: foreign
//! keys additionally compare cascade-delete, indexes compare
//! clustering, and primary keys compare constraint name and clustering.
//!
//! The matcher is stateless; every function takes both sides by
//! reference and returns owned pairings.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::model::{EntityModel, EntityType, Property};
use crate::schema::{Column, DatabaseModel, SchemaQualifiedName, Table};

/// A paired source/target table with its paired sub-objects.
///
/// Column, foreign-key and index pairs carry `(source name, target
/// name)`; anything not listed here is unpaired on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePairing {
    /// Source-side table.
    pub source: SchemaQualifiedName,
    /// Target-side table.
    pub target: SchemaQualifiedName,
    /// Paired columns as `(source, target)` names.
    pub columns: Vec<(String, String)>,
    /// Whether the primary keys are paired.
    pub key_paired: bool,
    /// Paired foreign keys as `(source, target)` names.
    pub foreign_keys: Vec<(String, String)>,
    /// Paired indexes as `(source, target)` names.
    pub indexes: Vec<(String, String)>,
}

/// Returns true if two properties match structurally: equal name and
/// equal source-type identity.
#[must_use]
pub fn match_properties(a: &Property, b: &Property) -> bool {
    a.name == b.name && a.source_type == b.source_type
}

/// Structural similarity of two entities over the cross-product of
/// their properties: `2 * matches / (|a| + |b|)`.
#[must_use]
pub fn entity_match_ratio(a: &EntityType, b: &EntityType) -> f64 {
    let total = a.properties.len() + b.properties.len();
    if total == 0 {
        return 0.0;
    }
    let matches: usize = a
        .properties
        .iter()
        .map(|p| b.properties.iter().filter(|q| match_properties(p, q)).count())
        .sum();
    2.0 * matches as f64 / total as f64
}

/// A paired table with its column pairs, before sub-object validation.
struct PairContext<'a> {
    source_entity: &'a EntityType,
    target_entity: &'a EntityType,
    source_table: &'a Table,
    target_table: &'a Table,
    columns: Vec<(String, String)>,
}

/// Pairs the entities of two models and translates the pairings to the
/// database level.
///
/// `fuzzy_ratio` is the minimum [`entity_match_ratio`] for a fuzzy
/// entity pair. Simple (exact-name) matches always win over fuzzy ones;
/// fuzzy matching takes the first acceptable pair in source-then-target
/// iteration order and removes both sides from further consideration.
pub fn match_models(
    source: &EntityModel,
    target: &EntityModel,
    source_db: &DatabaseModel,
    target_db: &DatabaseModel,
    fuzzy_ratio: f64,
) -> Result<Vec<TablePairing>> {
    let entity_pairs = match_entities(source, target, fuzzy_ratio);

    // First resolve every table's column pairs, so that foreign keys
    // reaching across tables can be validated against the pairs of the
    // table they reference.
    let mut contexts = Vec::with_capacity(entity_pairs.len());
    let mut by_source_table: HashMap<SchemaQualifiedName, usize> = HashMap::new();
    for (si, ti) in entity_pairs {
        let source_entity = &source.entities[si];
        let target_entity = &target.entities[ti];
        let source_table = find_table(source_db, &source_entity.table_name(), "source")?;
        let target_table = find_table(target_db, &target_entity.table_name(), "target")?;
        let columns = pair_columns(source_entity, target_entity, source_table, target_table)?;
        by_source_table.insert(source_table.name.clone(), contexts.len());
        contexts.push(PairContext {
            source_entity,
            target_entity,
            source_table,
            target_table,
            columns,
        });
    }

    let mut pairings = Vec::with_capacity(contexts.len());
    for context in &contexts {
        let key_paired = pair_keys(context);
        let foreign_keys = pair_foreign_keys(
            source,
            target,
            context,
            source_db,
            target_db,
            &contexts,
            &by_source_table,
        )?;
        let indexes = pair_indexes(context)?;
        pairings.push(TablePairing {
            source: context.source_table.name.clone(),
            target: context.target_table.name.clone(),
            columns: context.columns.clone(),
            key_paired,
            foreign_keys,
            indexes,
        });
    }
    Ok(pairings)
}

/// Pairs entities by exact name, then fuzzily by structural similarity.
fn match_entities(
    source: &EntityModel,
    target: &EntityModel,
    fuzzy_ratio: f64,
) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut used_source = vec![false; source.entities.len()];
    let mut used_target = vec![false; target.entities.len()];

    for (si, source_entity) in source.entities.iter().enumerate() {
        if let Some(ti) = target
            .entities
            .iter()
            .position(|t| t.name == source_entity.name)
        {
            if !used_target[ti] {
                pairs.push((si, ti));
                used_source[si] = true;
                used_target[ti] = true;
            }
        }
    }

    for (si, source_entity) in source.entities.iter().enumerate() {
        if used_source[si] {
            continue;
        }
        for (ti, target_entity) in target.entities.iter().enumerate() {
            if used_target[ti] {
                continue;
            }
            let ratio = entity_match_ratio(source_entity, target_entity);
            if ratio >= fuzzy_ratio {
                debug!(
                    source = %source_entity.name,
                    target = %target_entity.name,
                    ratio,
                    "fuzzy entity pair"
                );
                pairs.push((si, ti));
                used_source[si] = true;
                used_target[ti] = true;
                break;
            }
        }
    }
    pairs
}

/// Pairs properties within a paired entity pair and translates them to
/// column-name pairs, validating that every column exists.
fn pair_columns(
    source_entity: &EntityType,
    target_entity: &EntityType,
    source_table: &Table,
    target_table: &Table,
) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut used_source = vec![false; source_entity.properties.len()];
    let mut used_target = vec![false; target_entity.properties.len()];

    for (si, source_property) in source_entity.properties.iter().enumerate() {
        if let Some(ti) = target_entity
            .properties
            .iter()
            .position(|t| t.name == source_property.name)
        {
            if !used_target[ti] {
                pairs.push((si, ti));
                used_source[si] = true;
                used_target[ti] = true;
            }
        }
    }

    // Fuzzy tier: an explicit column-name annotation on both sides,
    // equal annotations, and equal source types.
    for (si, source_property) in source_entity.properties.iter().enumerate() {
        if used_source[si] {
            continue;
        }
        let Some(source_column) = source_property.column_name.as_deref() else {
            continue;
        };
        for (ti, target_property) in target_entity.properties.iter().enumerate() {
            if used_target[ti] {
                continue;
            }
            let annotated = target_property.column_name.as_deref() == Some(source_column);
            if annotated && source_property.source_type == target_property.source_type {
                pairs.push((si, ti));
                used_source[si] = true;
                used_target[ti] = true;
                break;
            }
        }
    }

    pairs
        .into_iter()
        .map(|(si, ti)| {
            let source_name = source_entity.properties[si].effective_column_name();
            let target_name = target_entity.properties[ti].effective_column_name();
            find_column(source_table, source_name)?;
            find_column(target_table, target_name)?;
            Ok((source_name.to_string(), target_name.to_string()))
        })
        .collect()
}

/// Pairs primary keys, then re-validates at the database level where
/// the predicate also compares constraint name and clustering.
fn pair_keys(context: &PairContext<'_>) -> bool {
    let model_paired = match (&context.source_entity.key, &context.target_entity.key) {
        (Some(source_key), Some(target_key)) => property_lists_match(
            context.source_entity,
            &source_key.properties,
            context.target_entity,
            &target_key.properties,
        ),
        _ => false,
    };
    if !model_paired {
        return false;
    }
    match (
        &context.source_table.primary_key,
        &context.target_table.primary_key,
    ) {
        (Some(source_pk), Some(target_pk)) => {
            source_pk.name == target_pk.name
                && source_pk.clustered == target_pk.clustered
                && column_lists_match(
                    context.source_table,
                    &source_pk.columns,
                    context.target_table,
                    &target_pk.columns,
                    Some(&context.columns),
                )
        }
        _ => false,
    }
}

/// Pairs foreign keys over the cross-product within a paired entity
/// pair, then re-validates at the database level where the predicate
/// also compares cascade-delete.
fn pair_foreign_keys(
    source: &EntityModel,
    target: &EntityModel,
    context: &PairContext<'_>,
    source_db: &DatabaseModel,
    target_db: &DatabaseModel,
    contexts: &[PairContext<'_>],
    by_source_table: &HashMap<SchemaQualifiedName, usize>,
) -> Result<Vec<(String, String)>> {
    let mut model_pairs = Vec::new();
    let mut used_target = vec![false; context.target_entity.foreign_keys.len()];

    for source_fk in &context.source_entity.foreign_keys {
        for (ti, target_fk) in context.target_entity.foreign_keys.iter().enumerate() {
            if used_target[ti] {
                continue;
            }
            let flags_agree =
                source_fk.unique == target_fk.unique && source_fk.required == target_fk.required;
            let properties_agree = property_lists_match(
                context.source_entity,
                &source_fk.properties,
                context.target_entity,
                &target_fk.properties,
            );
            let refs_agree = referenced_lists_match(
                source,
                &source_fk.ref_entity,
                &source_fk.ref_properties,
                target,
                &target_fk.ref_entity,
                &target_fk.ref_properties,
            );
            if flags_agree && properties_agree && refs_agree {
                model_pairs.push((source_fk.name.clone(), target_fk.name.clone()));
                used_target[ti] = true;
                break;
            }
        }
    }

    let mut pairs = Vec::new();
    for (source_name, target_name) in model_pairs {
        let source_fk = context
            .source_table
            .foreign_keys
            .iter()
            .find(|fk| fk.name == source_name)
            .ok_or_else(|| missing("foreign key", &source_name, &context.source_table.name))?;
        let target_fk = context
            .target_table
            .foreign_keys
            .iter()
            .find(|fk| fk.name == target_name)
            .ok_or_else(|| missing("foreign key", &target_name, &context.target_table.name))?;

        let flags_agree = source_fk.unique == target_fk.unique
            && source_fk.required == target_fk.required
            && source_fk.cascade_delete == target_fk.cascade_delete;
        let columns_agree = column_lists_match(
            context.source_table,
            &source_fk.columns,
            context.target_table,
            &target_fk.columns,
            Some(&context.columns),
        );
        // Referenced columns are validated against the referenced
        // table's own column pairs when that table is paired.
        let referenced_pairs = by_source_table
            .get(&source_fk.ref_table)
            .map(|&i| &contexts[i])
            .filter(|c| c.target_table.name == target_fk.ref_table)
            .map(|c| c.columns.as_slice());
        let refs_agree = match (
            source_db.get_table(&source_fk.ref_table),
            target_db.get_table(&target_fk.ref_table),
        ) {
            (Some(source_ref), Some(target_ref)) => column_lists_match(
                source_ref,
                &source_fk.ref_columns,
                target_ref,
                &target_fk.ref_columns,
                referenced_pairs,
            ),
            _ => false,
        };
        if flags_agree && columns_agree && refs_agree {
            pairs.push((source_name, target_name));
        }
    }
    Ok(pairs)
}

/// Pairs indexes over the cross-product within a paired entity pair,
/// then re-validates at the database level where the predicate also
/// compares clustering.
fn pair_indexes(context: &PairContext<'_>) -> Result<Vec<(String, String)>> {
    let mut model_pairs = Vec::new();
    let mut used_target = vec![false; context.target_entity.indexes.len()];

    for source_index in &context.source_entity.indexes {
        for (ti, target_index) in context.target_entity.indexes.iter().enumerate() {
            if used_target[ti] {
                continue;
            }
            let unique_agrees = source_index.unique == target_index.unique;
            let properties_agree = property_lists_match(
                context.source_entity,
                &source_index.properties,
                context.target_entity,
                &target_index.properties,
            );
            if unique_agrees && properties_agree {
                model_pairs.push((source_index.name.clone(), target_index.name.clone()));
                used_target[ti] = true;
                break;
            }
        }
    }

    let mut pairs = Vec::new();
    for (source_name, target_name) in model_pairs {
        let source_index = context
            .source_table
            .indexes
            .iter()
            .find(|i| i.name == source_name)
            .ok_or_else(|| missing("index", &source_name, &context.source_table.name))?;
        let target_index = context
            .target_table
            .indexes
            .iter()
            .find(|i| i.name == target_name)
            .ok_or_else(|| missing("index", &target_name, &context.target_table.name))?;

        let agrees = source_index.unique == target_index.unique
            && source_index.clustered == target_index.clustered
            && column_lists_match(
                context.source_table,
                &source_index.columns,
                context.target_table,
                &target_index.columns,
                Some(&context.columns),
            );
        if agrees {
            pairs.push((source_name, target_name));
        }
    }
    Ok(pairs)
}

/// Pairwise [`match_properties`] over two property-name lists.
fn property_lists_match(
    source_entity: &EntityType,
    source_properties: &[String],
    target_entity: &EntityType,
    target_properties: &[String],
) -> bool {
    if source_properties.len() != target_properties.len() {
        return false;
    }
    source_properties
        .iter()
        .zip(target_properties)
        .all(|(s, t)| {
            match (source_entity.get_property(s), target_entity.get_property(t)) {
                (Some(sp), Some(tp)) => match_properties(sp, tp),
                _ => false,
            }
        })
}

/// Pairwise [`match_properties`] over referenced-property lists,
/// resolved against the referenced entities.
fn referenced_lists_match(
    source: &EntityModel,
    source_ref_entity: &str,
    source_properties: &[String],
    target: &EntityModel,
    target_ref_entity: &str,
    target_properties: &[String],
) -> bool {
    match (
        source.get_entity(source_ref_entity),
        target.get_entity(target_ref_entity),
    ) {
        (Some(source_entity), Some(target_entity)) => property_lists_match(
            source_entity,
            source_properties,
            target_entity,
            target_properties,
        ),
        _ => false,
    }
}

/// Pairwise database-level column matching over two column-name lists.
///
/// Two columns agree when their source types are equal and the target
/// name is the one the source column is paired with (its own name when
/// the column is not part of a rename pair).
fn column_lists_match(
    source_table: &Table,
    source_columns: &[String],
    target_table: &Table,
    target_columns: &[String],
    column_pairs: Option<&[(String, String)]>,
) -> bool {
    if source_columns.len() != target_columns.len() {
        return false;
    }
    source_columns.iter().zip(target_columns).all(|(s, t)| {
        let (Some(source_column), Some(target_column)) =
            (source_table.get_column(s), target_table.get_column(t))
        else {
            return false;
        };
        if source_column.source_type != target_column.source_type {
            return false;
        }
        let expected = column_pairs
            .and_then(|pairs| pairs.iter().find(|(from, _)| from == s))
            .map_or(s.as_str(), |(_, to)| to.as_str());
        expected == t.as_str()
    })
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

fn find_column<'a>(table: &'a Table, name: &str) -> Result<&'a Column> {
    table.get_column(name).ok_or_else(|| {
        MigrateError::InvariantViolation(format!(
            "paired column '{name}' does not exist in table '{}'",
            table.name
        ))
    })
}

fn missing(what: &str, name: &str, table: &SchemaQualifiedName) -> MigrateError {
    MigrateError::InvariantViolation(format!(
        "paired {what} '{name}' does not exist in table '{table}'"
    ))
}
