//! Seeded store for database-backed tests.

use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::config::ExportConfig;
use crate::db_migration;
use crate::globals;

const WORDPRESS_SCHEMA: &str = r#"
CREATE TABLE wp_posts (
    ID INTEGER PRIMARY KEY,
    post_author INTEGER NOT NULL DEFAULT 0,
    post_date TEXT NOT NULL DEFAULT '',
    post_content TEXT NOT NULL DEFAULT '',
    post_title TEXT NOT NULL DEFAULT '',
    post_status TEXT NOT NULL DEFAULT 'publish',
    post_name TEXT NOT NULL DEFAULT '',
    post_type TEXT NOT NULL DEFAULT 'post'
);
CREATE TABLE wp_postmeta (
    meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL,
    meta_key TEXT,
    meta_value TEXT
);
CREATE TABLE wp_users (
    ID INTEGER PRIMARY KEY,
    user_login TEXT NOT NULL DEFAULT '',
    user_email TEXT NOT NULL DEFAULT '',
    display_name TEXT NOT NULL DEFAULT ''
);
CREATE TABLE wp_usermeta (
    umeta_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    meta_key TEXT,
    meta_value TEXT
);
CREATE TABLE wp_comments (
    comment_ID INTEGER PRIMARY KEY,
    comment_post_ID INTEGER NOT NULL DEFAULT 0,
    comment_author TEXT NOT NULL DEFAULT '',
    comment_content TEXT NOT NULL DEFAULT ''
);
CREATE TABLE wp_commentmeta (
    meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
    comment_id INTEGER NOT NULL,
    meta_key TEXT,
    meta_value TEXT
);
CREATE TABLE wp_terms (
    term_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    slug TEXT NOT NULL DEFAULT '',
    term_group INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE wp_termmeta (
    meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
    term_id INTEGER NOT NULL,
    meta_key TEXT,
    meta_value TEXT
);
CREATE TABLE wp_term_taxonomy (
    term_taxonomy_id INTEGER PRIMARY KEY,
    term_id INTEGER NOT NULL,
    taxonomy TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    parent INTEGER NOT NULL DEFAULT 0,
    count INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE wp_term_relationships (
    object_id INTEGER NOT NULL,
    term_taxonomy_id INTEGER NOT NULL,
    term_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (object_id, term_taxonomy_id)
);
"#;

// term_taxonomy ids deliberately differ from term ids
const SEED_DATA: &str = r#"
INSERT INTO wp_posts (ID, post_date, post_title, post_status, post_type) VALUES
    (1, '2024-01-05 10:00:00', 'Hello, "World"', 'publish', 'post'),
    (2, '2024-02-01 09:30:00', 'Draft one', 'draft', 'post'),
    (3, '2024-02-15 12:00:00', 'About', 'publish', 'page'),
    (4, '2024-03-10 08:15:00', 'Second
line', 'publish', 'post');
INSERT INTO wp_postmeta (post_id, meta_key, meta_value) VALUES
    (1, 'rating', '5'),
    (2, 'rating', '2'),
    (4, 'rating', 'abc'),
    (1, 'color', 'red'),
    (1, 'color', 'blue'),
    (3, 'subtitle', 'Who we are');
INSERT INTO wp_users (ID, user_login, user_email, display_name) VALUES
    (1, 'admin', 'admin@example.com', 'Site Admin'),
    (2, 'obrien', 'o@example.com', 'Pat O''Brien');
INSERT INTO wp_usermeta (user_id, meta_key, meta_value) VALUES
    (1, 'nickname', 'boss'),
    (2, 'nickname', '');
INSERT INTO wp_comments (comment_ID, comment_post_ID, comment_author, comment_content) VALUES
    (1, 1, 'Pat', 'Nice post');
INSERT INTO wp_terms (term_id, name, slug) VALUES
    (1, 'News', 'news'),
    (2, 'Tech', 'tech'),
    (3, 'Featured', 'featured');
INSERT INTO wp_term_taxonomy (term_taxonomy_id, term_id, taxonomy) VALUES
    (10, 1, 'category'),
    (11, 2, 'category'),
    (12, 3, 'post_tag');
INSERT INTO wp_term_relationships (object_id, term_taxonomy_id) VALUES
    (1, 10),
    (1, 11),
    (4, 12);
"#;

/// A migrated, seeded store in a temporary directory, removed on drop.
pub struct TestStore {
    pub pool: SqlitePool,
    pub dir: TempDir,
}

impl TestStore {
    pub async fn seeded() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("site.db").display());
        let pool = globals::create_pool(&url, 4, ExportConfig::default().busy_timeout())
            .await
            .unwrap();

        db_migration::initialize_database(&pool).await.unwrap();
        sqlx::query(WORDPRESS_SCHEMA).execute(&pool).await.unwrap();
        sqlx::query(SEED_DATA).execute(&pool).await.unwrap();

        Self { pool, dir }
    }
}
