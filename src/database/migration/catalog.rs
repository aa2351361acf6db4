//! Migration catalog of the phrasebook store
//!
//! Append new migrations at the end. Never rename, reorder or remove an
//! entry that has shipped: the ledger only knows names.

use super::Migration;

pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        "001_create_folders",
        &[r#"
        CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            parent_id TEXT REFERENCES folders(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#],
    ),
    Migration::new(
        "002_create_genres",
        &[
            r#"
            CREATE TABLE IF NOT EXISTS genres (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            )
            "#,
            "-- seeded on first use by the app, not here",
        ],
    ),
    Migration::new(
        "003_create_projects",
        &[
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                genre_id TEXT REFERENCES genres(id) ON DELETE SET NULL,
                folder_id TEXT REFERENCES folders(id) ON DELETE SET NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_projects_folder ON projects(folder_id)",
            "CREATE INDEX IF NOT EXISTS idx_projects_genre ON projects(genre_id)",
        ],
    ),
    Migration::new(
        "004_create_phrases",
        &[
            r#"
            CREATE TABLE IF NOT EXISTS phrases (
                id TEXT PRIMARY KEY,
                project_id TEXT REFERENCES projects(id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_phrases_project ON phrases(project_id, position)",
        ],
    ),
    Migration::new(
        "005_create_tags",
        &[
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                color TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
            r#"
            /* many-to-many between phrases and tags */
            CREATE TABLE IF NOT EXISTS phrase_tags (
                phrase_id TEXT NOT NULL REFERENCES phrases(id) ON DELETE CASCADE,
                tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (phrase_id, tag_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_phrase_tags_tag ON phrase_tags(tag_id)",
        ],
    ),
    Migration::new(
        "006_phrases_favorite",
        &["ALTER TABLE phrases ADD COLUMN is_favorite INTEGER NOT NULL DEFAULT 0 -- starred in the UI"],
    ),
];
