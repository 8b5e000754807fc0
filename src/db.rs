// src/db.rs - Database migrations, seeds and setup

use sqlx::SqlitePool;
use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    // Create users table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE CHECK(length(username) >= 3 AND length(username) <= 50),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'member' CHECK(
                role IN ('admin', 'coordinator', 'member')
            ),
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            last_login DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until DATETIME
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Reference tables: statuses and priorities carry an ordinal value that
    // defines the kanban column order and the sort comparators.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statuses (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 100),
            value INTEGER NOT NULL UNIQUE,
            color TEXT CHECK(color IS NULL OR length(color) <= 20),
            created_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS priorities (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 100),
            value INTEGER NOT NULL UNIQUE,
            color TEXT CHECK(color IS NULL OR length(color) <= 20),
            created_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_types (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 100),
            value INTEGER NOT NULL UNIQUE,
            notice_days INTEGER NOT NULL DEFAULT 0 CHECK(notice_days >= 0),
            warning TEXT CHECK(warning IS NULL OR length(warning) <= 500),
            color TEXT CHECK(color IS NULL OR length(color) <= 20),
            created_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Requests: the 5W1H core. `when` and `where` are SQL keywords, stored
    // as when_ / where_ (same convention the schema uses for other clashes).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            who TEXT NOT NULL CHECK(length(who) > 0 AND length(who) <= 255),
            what TEXT NOT NULL CHECK(length(what) > 0 AND length(what) <= 1000),
            when_ TEXT NOT NULL CHECK(length(when_) > 0 AND length(when_) <= 255),
            where_ TEXT NOT NULL CHECK(length(where_) > 0 AND length(where_) <= 255),
            why TEXT NOT NULL CHECK(length(why) > 0 AND length(why) <= 1000),
            how TEXT NOT NULL CHECK(length(how) > 0 AND length(how) <= 1000),
            info TEXT CHECK(info IS NULL OR length(info) <= 2000),
            due_at DATETIME,
            flow TEXT,
            status_id TEXT NOT NULL,
            priority_id TEXT NOT NULL,
            type_id TEXT NOT NULL,
            created_by TEXT,
            updated_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (status_id) REFERENCES statuses (id),
            FOREIGN KEY (priority_id) REFERENCES priorities (id),
            FOREIGN KEY (type_id) REFERENCES request_types (id),
            FOREIGN KEY (created_by) REFERENCES users (id),
            FOREIGN KEY (updated_by) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Catalog: equipment availability is a bounded count, the rest are flags
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS equipment (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 255),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            quantity INTEGER NOT NULL DEFAULT 1 CHECK(quantity >= 0),
            available INTEGER NOT NULL DEFAULT 0 CHECK(available >= 0 AND available <= quantity),
            archived INTEGER NOT NULL DEFAULT 0 CHECK(archived IN (0, 1)),
            created_by TEXT,
            updated_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (created_by) REFERENCES users (id),
            FOREIGN KEY (updated_by) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL CHECK(length(title) > 0 AND length(title) <= 255),
            author TEXT CHECK(author IS NULL OR length(author) <= 255),
            instrumental INTEGER NOT NULL DEFAULT 0 CHECK(instrumental IN (0, 1)),
            lyrics INTEGER NOT NULL DEFAULT 0 CHECK(lyrics IN (0, 1)),
            archived INTEGER NOT NULL DEFAULT 0 CHECK(archived IN (0, 1)),
            created_by TEXT,
            updated_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE(title, author),
            FOREIGN KEY (created_by) REFERENCES users (id),
            FOREIGN KEY (updated_by) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS venues (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 255),
            location TEXT CHECK(location IS NULL OR length(location) <= 255),
            capacity INTEGER CHECK(capacity IS NULL OR (capacity >= 1 AND capacity <= 100000)),
            available INTEGER NOT NULL DEFAULT 1 CHECK(available IN (0, 1)),
            archived INTEGER NOT NULL DEFAULT 0 CHECK(archived IN (0, 1)),
            created_by TEXT,
            updated_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (created_by) REFERENCES users (id),
            FOREIGN KEY (updated_by) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 255),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            available INTEGER NOT NULL DEFAULT 1 CHECK(available IN (0, 1)),
            archived INTEGER NOT NULL DEFAULT 0 CHECK(archived IN (0, 1)),
            created_by TEXT,
            updated_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (created_by) REFERENCES users (id),
            FOREIGN KEY (updated_by) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Join tables between requests and catalog resources
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_equipment (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            equipment_id TEXT NOT NULL,
            amount INTEGER NOT NULL DEFAULT 1 CHECK(amount >= 1),
            created_at DATETIME NOT NULL,
            UNIQUE(request_id, equipment_id),
            FOREIGN KEY (request_id) REFERENCES requests (id) ON DELETE CASCADE,
            FOREIGN KEY (equipment_id) REFERENCES equipment (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_songs (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            song_id TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            UNIQUE(request_id, song_id),
            FOREIGN KEY (request_id) REFERENCES requests (id) ON DELETE CASCADE,
            FOREIGN KEY (song_id) REFERENCES songs (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_venues (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            venue_id TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            UNIQUE(request_id, venue_id),
            FOREIGN KEY (request_id) REFERENCES requests (id) ON DELETE CASCADE,
            FOREIGN KEY (venue_id) REFERENCES venues (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_items (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            UNIQUE(request_id, item_id),
            FOREIGN KEY (request_id) REFERENCES requests (id) ON DELETE CASCADE,
            FOREIGN KEY (item_id) REFERENCES items (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS request_assignees (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            UNIQUE(request_id, user_id),
            FOREIGN KEY (request_id) REFERENCES requests (id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Attachments and notes hang off a request
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attachments (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            original_filename TEXT NOT NULL CHECK(length(original_filename) > 0),
            stored_filename TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL CHECK(file_size > 0),
            mime_type TEXT NOT NULL,
            uploaded_by TEXT,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (request_id) REFERENCES requests (id) ON DELETE CASCADE,
            FOREIGN KEY (uploaded_by) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            author TEXT NOT NULL CHECK(length(author) > 0 AND length(author) <= 255),
            body TEXT NOT NULL CHECK(length(body) > 0 AND length(body) <= 2000),
            created_at DATETIME NOT NULL,
            FOREIGN KEY (request_id) REFERENCES requests (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Audit trail
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            description TEXT,
            changes TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    // ==================== CREATE INDEXES ====================

    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_priority ON requests(priority_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_type ON requests(type_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_due ON requests(due_at)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_created ON requests(created_at)")
        .execute(pool).await;

    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_request_equipment_request ON request_equipment(request_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_request_songs_request ON request_songs(request_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_request_venues_request ON request_venues(request_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_request_items_request ON request_items(request_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_request_assignees_request ON request_assignees(request_id)")
        .execute(pool).await;

    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_attachments_request ON attachments(request_id)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_request ON notes(request_id)")
        .execute(pool).await;

    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_equipment_archived ON equipment(archived)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_archived ON songs(archived)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_venues_archived ON venues(archived)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_archived ON items(archived)")
        .execute(pool).await;

    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_logs(entity_type)")
        .execute(pool).await;
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_record ON audit_logs(entity_id)")
        .execute(pool).await;

    // Seed reference data for a fresh database
    seed_reference_data(pool).await?;

    Ok(())
}

// ==================== REFERENCE DATA SEEDS ====================

/// Insert the default status pipeline, priorities and request types when the
/// reference tables are empty. The ordinal values leave gaps so rows can be
/// inserted between them later without renumbering.
pub async fn seed_reference_data(pool: &SqlitePool) -> Result<()> {
    let status_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM statuses")
        .fetch_one(pool)
        .await?;

    if status_count.0 == 0 {
        let statuses = [
            ("New", 10, "#64748b"),
            ("Accepted", 20, "#0ea5e9"),
            ("In Progress", 30, "#f59e0b"),
            ("Done", 40, "#22c55e"),
            ("Rejected", 50, "#ef4444"),
        ];
        for (name, value, color) in statuses {
            sqlx::query(
                "INSERT INTO statuses (id, name, value, color, created_at) VALUES (?, ?, ?, ?, ?)"
            )
                .bind(Uuid::new_v4().to_string())
                .bind(name)
                .bind(value)
                .bind(color)
                .bind(Utc::now())
                .execute(pool)
                .await?;
        }
        log::info!("Seeded {} default statuses", statuses.len());
    }

    let priority_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM priorities")
        .fetch_one(pool)
        .await?;

    if priority_count.0 == 0 {
        let priorities = [
            ("Low", 10, "#94a3b8"),
            ("Normal", 20, "#0ea5e9"),
            ("High", 30, "#f59e0b"),
            ("Urgent", 40, "#ef4444"),
        ];
        for (name, value, color) in priorities {
            sqlx::query(
                "INSERT INTO priorities (id, name, value, color, created_at) VALUES (?, ?, ?, ?, ?)"
            )
                .bind(Uuid::new_v4().to_string())
                .bind(name)
                .bind(value)
                .bind(color)
                .bind(Utc::now())
                .execute(pool)
                .await?;
        }
        log::info!("Seeded {} default priorities", priorities.len());
    }

    let type_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM request_types")
        .fetch_one(pool)
        .await?;

    if type_count.0 == 0 {
        let types: [(&str, i64, i64, Option<&str>); 4] = [
            ("General", 10, 0, None),
            ("Equipment Loan", 20, 3,
             Some("Equipment loans need at least three days of lead time.")),
            ("Song Arrangement", 30, 7,
             Some("Song arrangements need at least a week of lead time.")),
            ("Event Support", 40, 14,
             Some("Event support requests need at least two weeks of lead time.")),
        ];
        for (name, value, notice_days, warning) in types {
            sqlx::query(
                "INSERT INTO request_types (id, name, value, notice_days, warning, created_at) VALUES (?, ?, ?, ?, ?, ?)"
            )
                .bind(Uuid::new_v4().to_string())
                .bind(name)
                .bind(value)
                .bind(notice_days)
                .bind(warning)
                .bind(Utc::now())
                .execute(pool)
                .await?;
        }
        log::info!("Seeded {} default request types", types.len());
    }

    Ok(())
}

// ==================== DATABASE RESET (DEVELOPMENT ONLY) ====================

#[allow(dead_code)]
pub async fn reset_database(pool: &SqlitePool) -> Result<()> {
    log::warn!("Resetting database - all data will be lost!");

    let drop_queries = [
        "DROP TABLE IF EXISTS audit_logs",
        "DROP TABLE IF EXISTS notes",
        "DROP TABLE IF EXISTS attachments",
        "DROP TABLE IF EXISTS request_assignees",
        "DROP TABLE IF EXISTS request_items",
        "DROP TABLE IF EXISTS request_venues",
        "DROP TABLE IF EXISTS request_songs",
        "DROP TABLE IF EXISTS request_equipment",
        "DROP TABLE IF EXISTS requests",
        "DROP TABLE IF EXISTS items",
        "DROP TABLE IF EXISTS venues",
        "DROP TABLE IF EXISTS songs",
        "DROP TABLE IF EXISTS equipment",
        "DROP TABLE IF EXISTS request_types",
        "DROP TABLE IF EXISTS priorities",
        "DROP TABLE IF EXISTS statuses",
        "DROP TABLE IF EXISTS users",
    ];

    for query in drop_queries.iter() {
        let _ = sqlx::query(query).execute(pool).await;
    }

    run_migrations(pool).await?;

    Ok(())
}
