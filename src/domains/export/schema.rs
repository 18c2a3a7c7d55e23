use super::types::DefaultField;

/// Table names for one store, all sharing a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    prefix: String,
}

impl StoreSchema {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn table(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn tag_tables(&self) -> TagTables {
        TagTables {
            terms: self.table("terms"),
            term_taxonomy: self.table("term_taxonomy"),
            term_relationships: self.table("term_relationships"),
        }
    }
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self::new("wp_")
    }
}

/// Tables that relate entities to named tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTables {
    pub terms: String,
    pub term_taxonomy: String,
    pub term_relationships: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Comment,
    Term,
    /// Any entity stored in the shared posts table
    PostLike,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypeConfig {
    pub kind: EntityKind,
    /// Human label stored on the job record
    pub label: String,
    pub entity_table: String,
    pub attribute_table: String,
    pub entity_id_column: &'static str,
    pub attribute_entity_id_column: &'static str,
    /// Monotonic row id of the attribute table
    pub attribute_row_id_column: &'static str,
    /// Set when the entity table is shared across subtypes
    pub subtype: Option<String>,
}

impl EntityTypeConfig {
    /// Column that pins a shared table to one subtype.
    pub const SUBTYPE_COLUMN: &'static str = "post_type";

    pub fn supports_tags(&self) -> bool {
        self.kind == EntityKind::PostLike
    }

    /// Fixed columns offered for selection, sorted by label.
    pub fn default_fields(&self) -> Vec<DefaultField> {
        let columns: &[(&str, &str)] = match self.kind {
            EntityKind::User => USER_COLUMNS,
            EntityKind::Comment => COMMENT_COLUMNS,
            EntityKind::Term => TERM_COLUMNS,
            EntityKind::PostLike => POST_COLUMNS,
        };
        let mut fields: Vec<DefaultField> = columns
            .iter()
            .map(|(name, label)| DefaultField {
                name: name.to_string(),
                label: label.to_string(),
            })
            .collect();
        fields.sort_by(|a, b| a.label.cmp(&b.label));
        fields
    }
}

/// Map an entity type name to its tables. Total: anything unrecognised is a
/// post-like subtype.
pub fn resolve_entity_type(schema: &StoreSchema, name: &str) -> EntityTypeConfig {
    match name {
        "user" => EntityTypeConfig {
            kind: EntityKind::User,
            label: "Users".to_string(),
            entity_table: schema.table("users"),
            attribute_table: schema.table("usermeta"),
            entity_id_column: "ID",
            attribute_entity_id_column: "user_id",
            attribute_row_id_column: "umeta_id",
            subtype: None,
        },
        "comment" => EntityTypeConfig {
            kind: EntityKind::Comment,
            label: "Comments".to_string(),
            entity_table: schema.table("comments"),
            attribute_table: schema.table("commentmeta"),
            entity_id_column: "comment_ID",
            attribute_entity_id_column: "comment_id",
            attribute_row_id_column: "meta_id",
            subtype: None,
        },
        "taxonomy" | "term" => EntityTypeConfig {
            kind: EntityKind::Term,
            label: "Terms".to_string(),
            entity_table: schema.table("terms"),
            attribute_table: schema.table("termmeta"),
            entity_id_column: "term_id",
            attribute_entity_id_column: "term_id",
            attribute_row_id_column: "meta_id",
            subtype: None,
        },
        other => EntityTypeConfig {
            kind: EntityKind::PostLike,
            label: post_type_label(other),
            entity_table: schema.table("posts"),
            attribute_table: schema.table("postmeta"),
            entity_id_column: "ID",
            attribute_entity_id_column: "post_id",
            attribute_row_id_column: "meta_id",
            subtype: Some(other.to_string()),
        },
    }
}

fn post_type_label(name: &str) -> String {
    match name {
        "post" => "Posts".to_string(),
        "page" => "Pages".to_string(),
        other => other.to_string(),
    }
}

const USER_COLUMNS: &[(&str, &str)] = &[
    ("ID", "User ID"),
    ("user_login", "Username"),
    ("user_pass", "Hashed password"),
    ("user_nicename", "URL-friendly username"),
    ("user_email", "Email"),
    ("user_url", "URL"),
    ("user_registered", "Registration date/time"),
    ("user_activation_key", "Activation key"),
    ("user_status", "Status"),
    ("display_name", "Display name"),
];

const POST_COLUMNS: &[(&str, &str)] = &[
    ("ID", "Post ID"),
    ("post_author", "Author user ID"),
    ("post_date", "Date"),
    ("post_date_gmt", "Date (GMT)"),
    ("post_content", "Content"),
    ("post_title", "Title"),
    ("post_excerpt", "Excerpt"),
    ("post_status", "Status"),
    ("comment_status", "Comment status"),
    ("ping_status", "Ping status"),
    ("post_password", "Password"),
    ("post_name", "URL-friendly title"),
    ("to_ping", "To ping"),
    ("pinged", "Pinged"),
    ("post_modified", "Modified date"),
    ("post_modified_gmt", "Modified date (GMT)"),
    ("post_content_filtered", "Content (filtered)"),
    ("post_parent", "Parent post ID"),
    ("guid", "URL"),
    ("menu_order", "Menu order"),
    ("post_mime_type", "MIME type"),
    ("comment_count", "Comment count"),
];

const COMMENT_COLUMNS: &[(&str, &str)] = &[
    ("comment_ID", "ID"),
    ("comment_post_ID", "Post ID"),
    ("comment_author", "Author"),
    ("comment_author_email", "Author email"),
    ("comment_author_url", "Author URL"),
    ("comment_author_IP", "Author IP address"),
    ("comment_date", "Date"),
    ("comment_date_gmt", "Date (GMT)"),
    ("comment_content", "Content"),
    ("comment_karma", "Karma"),
    ("comment_approved", "Approved"),
    ("comment_agent", "Agent"),
    ("comment_type", "Type"),
    ("comment_parent", "Parent ID"),
    ("user_id", "User ID"),
];

const TERM_COLUMNS: &[(&str, &str)] = &[
    ("term_id", "ID"),
    ("name", "Name"),
    ("slug", "Slug"),
    ("term_group", "Group ID"),
];
