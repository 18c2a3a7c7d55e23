use uuid::Uuid;

use crate::errors::{DomainError, DomainResult, ValidationError};

use super::predicate::{compile_filter, SqlFragment};
use super::repository::status_update_sql;
use super::schema::{resolve_entity_type, EntityTypeConfig, StoreSchema, TagTables};
use super::sql::{qualified, quote_ident, quote_literal, JobTables};
use super::types::{ExportStatus, FieldKind, FieldRef, FilterSpec};

/// Separator between multiple attribute values of one entity
pub const ATTRIBUTE_VALUE_SEPARATOR: &str = "; ";
/// Separator between multiple tag names of one entity
pub const TAG_NAME_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Record that the job reached this step
    SetStatus(ExportStatus),
    Sql(String),
}

/// Ordered statements for one export, with status markers between the stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub entity_type: EntityTypeConfig,
    pub tables: JobTables,
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// The data statements alone, without status updates.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            PlanStep::Sql(sql) => Some(sql.as_str()),
            PlanStep::SetStatus(_) => None,
        })
    }

    /// Turn status markers into registry updates for `job_id`.
    pub fn render(&self, job_id: Uuid) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| match step {
                PlanStep::SetStatus(status) => status_update_sql(job_id, *status),
                PlanStep::Sql(sql) => sql.clone(),
            })
            .collect()
    }
}

/// Build the four-stage plan: scratch table, id filter, projection, cleanup.
pub fn compile_plan(
    schema: &StoreSchema,
    entity_type: &str,
    fields: &[FieldRef],
    filters: &[FilterSpec],
    tables: JobTables,
) -> DomainResult<ExecutionPlan> {
    if fields.is_empty() {
        return Err(DomainError::Validation(ValidationError::required("fields")));
    }

    let config = resolve_entity_type(schema, entity_type);
    let tags = schema.tag_tables();

    let create_scratch = format!(
        "CREATE TABLE {} (\"id\" INTEGER NOT NULL PRIMARY KEY)",
        quote_ident(&tables.scratch)
    );
    let filter_ids = compile_id_filter(&config, &tags, &tables, filters)?;
    let projection = compile_projection(&config, &tags, &tables, fields);
    let drop_scratch = format!("DROP TABLE IF EXISTS {}", quote_ident(&tables.scratch));

    let steps = vec![
        PlanStep::SetStatus(ExportStatus::PreparingScratch),
        PlanStep::Sql(create_scratch),
        PlanStep::SetStatus(ExportStatus::FilteringEntities),
        PlanStep::Sql(filter_ids),
        PlanStep::SetStatus(ExportStatus::CompilingResults),
        PlanStep::Sql(projection),
        PlanStep::SetStatus(ExportStatus::CleaningUp),
        PlanStep::Sql(drop_scratch),
        PlanStep::SetStatus(ExportStatus::Done),
    ];

    Ok(ExecutionPlan {
        entity_type: config,
        tables,
        steps,
    })
}

fn compile_id_filter(
    config: &EntityTypeConfig,
    tags: &TagTables,
    tables: &JobTables,
    filters: &[FilterSpec],
) -> DomainResult<String> {
    let entity_id = qualified(&config.entity_table, config.entity_id_column);

    let mut custom_joins = Vec::new();
    let mut tag_joins = Vec::new();
    let mut default_wheres = Vec::new();
    let mut tag_wheres = Vec::new();

    for (index, filter) in filters.iter().enumerate() {
        let fragment = compile_filter(config, tags, index, filter)?;
        let is_tag = filter.field.kind == FieldKind::Tag;
        match fragment {
            SqlFragment::Join(sql) if is_tag => tag_joins.push(sql),
            SqlFragment::Join(sql) => custom_joins.push(sql),
            SqlFragment::Where(sql) if is_tag => tag_wheres.push(sql),
            SqlFragment::Where(sql) => default_wheres.push(sql),
        }
    }

    let mut wheres = default_wheres;
    wheres.extend(tag_wheres);
    if let Some(subtype) = &config.subtype {
        wheres.push(format!(
            "{} = {}",
            qualified(&config.entity_table, EntityTypeConfig::SUBTYPE_COLUMN),
            quote_literal(subtype)
        ));
    }

    let mut sql = format!(
        "INSERT INTO {} (\"id\")\nSELECT DISTINCT {} FROM {}",
        quote_ident(&tables.scratch),
        entity_id,
        quote_ident(&config.entity_table)
    );
    for join in custom_joins.into_iter().chain(tag_joins) {
        sql.push('\n');
        sql.push_str(&join);
    }
    if !wheres.is_empty() {
        sql.push_str("\nWHERE ");
        sql.push_str(&wheres.join("\n  AND "));
    }
    Ok(sql)
}

fn compile_projection(
    config: &EntityTypeConfig,
    tags: &TagTables,
    tables: &JobTables,
    fields: &[FieldRef],
) -> String {
    let entity_id = qualified(&config.entity_table, config.entity_id_column);
    let scratch_ids = format!("SELECT \"id\" FROM {}", quote_ident(&tables.scratch));

    let mut columns = Vec::with_capacity(fields.len());
    let mut joins = Vec::new();

    for (index, field) in fields.iter().enumerate() {
        let label = quote_ident(field.label());
        match field.kind {
            FieldKind::Default => {
                columns.push(format!("{} AS {}", qualified(&config.entity_table, &field.name), label));
            }
            FieldKind::Custom => {
                let alias = format!("m{}", index);
                columns.push(format!("{} AS {}", qualified(&alias, "meta_values"), label));
                joins.push(format!(
                    "LEFT JOIN (\n    SELECT {fk}, group_concat(\"meta_value\", {sep}) AS \"meta_values\" FROM {table}\n    WHERE \"meta_key\" = {key} AND {fk} IN ({scratch_ids})\n    GROUP BY {fk}\n) {a} ON {entity_id} = {joined_fk}",
                    fk = quote_ident(config.attribute_entity_id_column),
                    sep = quote_literal(ATTRIBUTE_VALUE_SEPARATOR),
                    table = quote_ident(&config.attribute_table),
                    key = quote_literal(&field.name),
                    scratch_ids = scratch_ids,
                    a = quote_ident(&alias),
                    entity_id = entity_id,
                    joined_fk = qualified(&alias, config.attribute_entity_id_column),
                ));
            }
            FieldKind::Tag => {
                let alias = format!("t{}", index);
                let tr = format!("tr{}", index);
                let tx = format!("tx{}", index);
                let trm = format!("trm{}", index);
                columns.push(format!("{} AS {}", qualified(&alias, "name"), label));
                joins.push(format!(
                    "LEFT JOIN (\n    SELECT {tr_object} AS \"object_id\", group_concat({trm_name}, {sep}) AS \"name\" FROM {rel} {tr_a}\n    INNER JOIN {term_taxonomy} {tx_a} ON ({tx_id} = {tr_id} AND {tx_taxonomy} = {taxonomy})\n    INNER JOIN {terms} {trm_a} ON {trm_id} = {tx_term_id}\n    WHERE {tr_object} IN ({scratch_ids})\n    GROUP BY {tr_object}\n) {a} ON {joined_object} = {entity_id}",
                    tr_object = qualified(&tr, "object_id"),
                    trm_name = qualified(&trm, "name"),
                    sep = quote_literal(TAG_NAME_SEPARATOR),
                    rel = quote_ident(&tags.term_relationships),
                    tr_a = quote_ident(&tr),
                    term_taxonomy = quote_ident(&tags.term_taxonomy),
                    tx_a = quote_ident(&tx),
                    tx_id = qualified(&tx, "term_taxonomy_id"),
                    tr_id = qualified(&tr, "term_taxonomy_id"),
                    tx_taxonomy = qualified(&tx, "taxonomy"),
                    taxonomy = quote_literal(&field.name),
                    terms = quote_ident(&tags.terms),
                    trm_a = quote_ident(&trm),
                    trm_id = qualified(&trm, "term_id"),
                    tx_term_id = qualified(&tx, "term_id"),
                    scratch_ids = scratch_ids,
                    a = quote_ident(&alias),
                    joined_object = qualified(&alias, "object_id"),
                    entity_id = entity_id,
                ));
            }
        }
    }

    let mut sql = format!(
        "CREATE TABLE {} AS SELECT {} FROM {}",
        quote_ident(&tables.result),
        columns.join(", "),
        quote_ident(&config.entity_table)
    );
    for join in joins {
        sql.push('\n');
        sql.push_str(&join);
    }
    sql.push_str(&format!("\nWHERE {} IN ({})", entity_id, scratch_ids));
    sql
}
