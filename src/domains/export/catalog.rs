use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::{DomainError, DomainResult};

use super::schema::{resolve_entity_type, EntityTypeConfig, StoreSchema};
use super::sql::{qualified, quote_ident};
use super::types::{CustomField, FieldCatalog, FieldKind, FieldRef, TagField};

pub const EXAMPLE_VALUE_LIMIT: i64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    entity_table: String,
    subtype: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedKeys {
    high_water_mark: i64,
    keys: Vec<String>,
}

/// Distinct attribute keys per entity type.
///
/// Attribute rows never change their key, so a cached list stays valid until
/// a row with a higher id than the one recorded appears.
#[derive(Default)]
pub struct AttributeKeyCache {
    entries: RwLock<HashMap<CacheKey, CachedKeys>>,
}

impl AttributeKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, key: &CacheKey, current_high_water_mark: i64) -> Option<Vec<String>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|cached| cached.high_water_mark >= current_high_water_mark)
            .map(|cached| cached.keys.clone())
    }

    async fn put(&self, key: CacheKey, high_water_mark: i64, keys: Vec<String>) {
        self.entries
            .write()
            .await
            .insert(key, CachedKeys { high_water_mark, keys });
    }
}

/// Enumerates the fields a user can pick for an entity type.
pub struct FieldCatalogService {
    pool: SqlitePool,
    schema: StoreSchema,
    cache: AttributeKeyCache,
}

impl FieldCatalogService {
    pub fn new(pool: SqlitePool, schema: StoreSchema) -> Self {
        Self {
            pool,
            schema,
            cache: AttributeKeyCache::new(),
        }
    }

    pub async fn get_field_catalog(&self, entity_type: &str) -> DomainResult<FieldCatalog> {
        let config = resolve_entity_type(&self.schema, entity_type);

        let custom_fields = self
            .attribute_keys(&config)
            .await?
            .into_iter()
            .map(|name| CustomField { name })
            .collect();

        let tag_fields = if config.supports_tags() {
            Some(self.tag_fields(&config).await?)
        } else {
            None
        };

        Ok(FieldCatalog {
            default_fields: config.default_fields(),
            custom_fields,
            tag_fields,
        })
    }

    async fn high_water_mark(&self, config: &EntityTypeConfig) -> DomainResult<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX({}), 0) FROM {}",
            quote_ident(config.attribute_row_id_column),
            quote_ident(&config.attribute_table)
        );
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::Database(e.into()))
    }

    async fn attribute_keys(&self, config: &EntityTypeConfig) -> DomainResult<Vec<String>> {
        let key = CacheKey {
            entity_table: config.entity_table.clone(),
            subtype: config.subtype.clone(),
        };
        let high_water_mark = self.high_water_mark(config).await?;

        if let Some(keys) = self.cache.get(&key, high_water_mark).await {
            log::debug!("Attribute key cache hit for {:?}", key);
            return Ok(keys);
        }

        let keys: Vec<String> = match &config.subtype {
            Some(subtype) => {
                let sql = format!(
                    "SELECT DISTINCT m.\"meta_key\" FROM {attr} m INNER JOIN {ent} e ON m.{fk} = e.{id} WHERE e.{subtype_col} = ? AND m.\"meta_key\" IS NOT NULL ORDER BY m.\"meta_key\"",
                    attr = quote_ident(&config.attribute_table),
                    ent = quote_ident(&config.entity_table),
                    fk = quote_ident(config.attribute_entity_id_column),
                    id = quote_ident(config.entity_id_column),
                    subtype_col = quote_ident(EntityTypeConfig::SUBTYPE_COLUMN),
                );
                sqlx::query_scalar(&sql).bind(subtype).fetch_all(&self.pool).await
            }
            None => {
                let sql = format!(
                    "SELECT DISTINCT \"meta_key\" FROM {} WHERE \"meta_key\" IS NOT NULL ORDER BY \"meta_key\"",
                    quote_ident(&config.attribute_table)
                );
                sqlx::query_scalar(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(|e| DomainError::Database(e.into()))?;

        self.cache.put(key, high_water_mark, keys.clone()).await;
        Ok(keys)
    }

    async fn tag_fields(&self, config: &EntityTypeConfig) -> DomainResult<Vec<TagField>> {
        let tags = self.schema.tag_tables();
        let sql = format!(
            "SELECT DISTINCT tt.\"taxonomy\" FROM {tt} tt INNER JOIN {rel} tr ON tr.\"term_taxonomy_id\" = tt.\"term_taxonomy_id\" INNER JOIN {ent} e ON e.{id} = tr.\"object_id\" WHERE e.{subtype_col} = ? ORDER BY tt.\"taxonomy\"",
            tt = quote_ident(&tags.term_taxonomy),
            rel = quote_ident(&tags.term_relationships),
            ent = quote_ident(&config.entity_table),
            id = quote_ident(config.entity_id_column),
            subtype_col = quote_ident(EntityTypeConfig::SUBTYPE_COLUMN),
        );
        let names: Vec<String> = sqlx::query_scalar(&sql)
            .bind(config.subtype.as_deref().unwrap_or_default())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::Database(e.into()))?;

        Ok(names
            .into_iter()
            .map(|name| TagField {
                label: taxonomy_label(&name),
                name,
            })
            .collect())
    }

    /// Up to four random, distinct, non-empty values of `field` for previewing filters.
    pub async fn get_example_values(&self, entity_type: &str, field: &str) -> DomainResult<Vec<String>> {
        let config = resolve_entity_type(&self.schema, entity_type);
        let field = FieldRef::parse(field, "")?;

        let values: Vec<String> = match field.kind {
            FieldKind::Default => {
                let column = qualified(&config.entity_table, &field.name);
                let mut sql = format!(
                    "SELECT DISTINCT CAST({col} AS TEXT) AS v FROM {ent} WHERE {col} <> '' AND {col} IS NOT NULL",
                    col = column,
                    ent = quote_ident(&config.entity_table),
                );
                if config.subtype.is_some() {
                    sql.push_str(&format!(
                        " AND {} = ?",
                        qualified(&config.entity_table, EntityTypeConfig::SUBTYPE_COLUMN)
                    ));
                }
                let sql = random_sample(&sql);
                let mut query = sqlx::query_scalar(&sql);
                if let Some(subtype) = &config.subtype {
                    query = query.bind(subtype);
                }
                query.bind(EXAMPLE_VALUE_LIMIT).fetch_all(&self.pool).await
            }
            FieldKind::Custom => {
                let sql = random_sample(&format!(
                    "SELECT DISTINCT \"meta_value\" AS v FROM {} WHERE \"meta_key\" = ? AND \"meta_value\" <> '' AND \"meta_value\" IS NOT NULL",
                    quote_ident(&config.attribute_table)
                ));
                sqlx::query_scalar(&sql)
                    .bind(&field.name)
                    .bind(EXAMPLE_VALUE_LIMIT)
                    .fetch_all(&self.pool)
                    .await
            }
            FieldKind::Tag => {
                let tags = self.schema.tag_tables();
                let sql = random_sample(&format!(
                    "SELECT DISTINCT t.\"name\" AS v FROM {terms} t INNER JOIN {tt} tt ON tt.\"term_id\" = t.\"term_id\" WHERE tt.\"taxonomy\" = ? AND t.\"name\" <> ''",
                    terms = quote_ident(&tags.terms),
                    tt = quote_ident(&tags.term_taxonomy),
                ));
                sqlx::query_scalar(&sql)
                    .bind(&field.name)
                    .bind(EXAMPLE_VALUE_LIMIT)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| DomainError::Database(e.into()))?;

        Ok(values)
    }
}

fn random_sample(distinct_query: &str) -> String {
    format!("SELECT v FROM ({}) ORDER BY RANDOM() LIMIT ?", distinct_query)
}

/// `post_tag` becomes `Post tag`.
fn taxonomy_label(name: &str) -> String {
    let spaced = name.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
