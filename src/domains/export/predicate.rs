use crate::errors::{DomainError, DomainResult};

use super::schema::{EntityTypeConfig, TagTables};
use super::sql::{format_float, parse_float_prefix, qualified, quote_ident, quote_literal};
use super::types::{Cast, FieldKind, FilterSpec, Rule};

/// How a compiled filter attaches to the id-filtering statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlFragment {
    /// A boolean expression for the WHERE clause
    Where(String),
    /// A complete `INNER JOIN ... ON (...)` clause
    Join(String),
}

impl SqlFragment {
    pub fn is_join(&self) -> bool {
        matches!(self, SqlFragment::Join(_))
    }

    pub fn sql(&self) -> &str {
        match self {
            SqlFragment::Where(sql) | SqlFragment::Join(sql) => sql,
        }
    }
}

/// Compare an already quoted column expression against a user value.
pub fn compile_comparison(column: &str, rule: Rule, value: &str, cast: Option<Cast>) -> String {
    let op = match rule {
        // % and _ inside the value keep their wildcard meaning
        Rule::Contains => {
            return format!("{} LIKE {}", column, quote_literal(&format!("%{}%", value)))
        }
        Rule::NotContains => {
            return format!("{} NOT LIKE {}", column, quote_literal(&format!("%{}%", value)))
        }
        Rule::Empty => return format!("({} = '' OR {} IS NULL)", column, column),
        Rule::NotEmpty => return format!("({} <> '' AND {} IS NOT NULL)", column, column),
        Rule::Eq => "=",
        Rule::Neq => "<>",
        Rule::Gt => ">",
        Rule::Gte => ">=",
        Rule::Lt => "<",
        Rule::Lte => "<=",
    };

    match cast {
        Some(Cast::Date) => format!("datetime({}) {} datetime({})", column, op, quote_literal(value)),
        Some(Cast::Number) => format!(
            "CAST({} AS DOUBLE) {} {}",
            column,
            op,
            format_float(parse_float_prefix(value))
        ),
        Some(Cast::Alpha) | None => format!("{} {} {}", column, op, quote_literal(value)),
    }
}

/// Compile filter number `index` of a request. The index keeps join aliases unique.
pub fn compile_filter(
    config: &EntityTypeConfig,
    tags: &TagTables,
    index: usize,
    filter: &FilterSpec,
) -> DomainResult<SqlFragment> {
    let entity_id = qualified(&config.entity_table, config.entity_id_column);
    let value = filter.value_or_empty();

    match filter.field.kind {
        FieldKind::Default => {
            let column = qualified(&config.entity_table, &filter.field.name);
            Ok(SqlFragment::Where(compile_comparison(
                &column,
                filter.rule,
                value,
                filter.cast,
            )))
        }
        FieldKind::Custom => {
            let alias = format!("m{}", index);
            let comparison = compile_comparison(
                &qualified(&alias, "meta_value"),
                filter.rule,
                value,
                filter.cast,
            );
            Ok(SqlFragment::Join(format!(
                "INNER JOIN {table} {a} ON (\n    {fk} = {entity_id} AND\n    {key} = {name} AND\n    {comparison}\n)",
                table = quote_ident(&config.attribute_table),
                a = quote_ident(&alias),
                fk = qualified(&alias, config.attribute_entity_id_column),
                entity_id = entity_id,
                key = qualified(&alias, "meta_key"),
                name = quote_literal(&filter.field.name),
                comparison = comparison,
            )))
        }
        FieldKind::Tag => compile_tag_filter(tags, index, filter, &entity_id, value),
    }
}

fn compile_tag_filter(
    tags: &TagTables,
    index: usize,
    filter: &FilterSpec,
    entity_id: &str,
    value: &str,
) -> DomainResult<SqlFragment> {
    let taxonomy = quote_literal(&filter.field.name);

    match filter.rule {
        Rule::Contains | Rule::NotEmpty => {
            let join_alias = format!("tj{}", index);
            let tt = format!("tt{}", index);
            let trm = format!("trm{}", index);

            let mut ids = format!(
                "SELECT {tt_id} FROM {term_taxonomy} {tt} INNER JOIN {terms} {trm} ON {trm_id} = {tt_term_id} WHERE {tt_taxonomy} = {taxonomy}",
                tt_id = qualified(&tt, "term_taxonomy_id"),
                term_taxonomy = quote_ident(&tags.term_taxonomy),
                tt = quote_ident(&tt),
                terms = quote_ident(&tags.terms),
                trm = quote_ident(&trm),
                trm_id = qualified(&trm, "term_id"),
                tt_term_id = qualified(&tt, "term_id"),
                tt_taxonomy = qualified(&tt, "taxonomy"),
                taxonomy = taxonomy,
            );
            if filter.rule == Rule::Contains {
                ids.push_str(&format!(" AND {} = {}", qualified(&trm, "name"), quote_literal(value)));
            }

            Ok(SqlFragment::Join(format!(
                "INNER JOIN {rel} {a} ON (\n    {object_id} = {entity_id} AND\n    {tt_id} IN ({ids})\n)",
                rel = quote_ident(&tags.term_relationships),
                a = quote_ident(&join_alias),
                object_id = qualified(&join_alias, "object_id"),
                entity_id = entity_id,
                tt_id = qualified(&join_alias, "term_taxonomy_id"),
                ids = ids,
            )))
        }
        Rule::NotContains | Rule::Empty => {
            let tr = format!("tr{}", index);
            let tw = format!("tw{}", index);
            let trm = format!("trm{}", index);

            let names = format!(
                "SELECT {trm_name} FROM {rel} {tr} INNER JOIN {term_taxonomy} {tw} ON ({tw_id} = {tr_id} AND {tw_taxonomy} = {taxonomy}) INNER JOIN {terms} {trm} ON {trm_id} = {tw_term_id} WHERE {tr_object} = {entity_id}",
                trm_name = qualified(&trm, "name"),
                rel = quote_ident(&tags.term_relationships),
                tr = quote_ident(&tr),
                term_taxonomy = quote_ident(&tags.term_taxonomy),
                tw = quote_ident(&tw),
                tw_id = qualified(&tw, "term_taxonomy_id"),
                tr_id = qualified(&tr, "term_taxonomy_id"),
                tw_taxonomy = qualified(&tw, "taxonomy"),
                taxonomy = taxonomy,
                terms = quote_ident(&tags.terms),
                trm = quote_ident(&trm),
                trm_id = qualified(&trm, "term_id"),
                tw_term_id = qualified(&tw, "term_id"),
                tr_object = qualified(&tr, "object_id"),
                entity_id = entity_id,
            );

            let predicate = if filter.rule == Rule::NotContains {
                format!("{} NOT IN ({})", quote_literal(value), names)
            } else {
                format!("({} LIMIT 1) IS NULL", names)
            };
            Ok(SqlFragment::Where(predicate))
        }
        Rule::Eq | Rule::Neq | Rule::Gt | Rule::Gte | Rule::Lt | Rule::Lte => {
            Err(DomainError::UnsupportedRule {
                field: filter.field.key(),
                rule: filter.rule.to_string(),
            })
        }
    }
}
