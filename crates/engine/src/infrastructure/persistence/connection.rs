//! SQLite connection management and schema bootstrap.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Shared SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await?;
        tracing::info!("Connected to SQLite at {}", url);
        Ok(Self { pool })
    }

    /// In-memory database for tests. A single pooled connection: each
    /// `:memory:` connection would otherwise see its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create all tables and indexes if missing.
    pub async fn initialize_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                genre TEXT NOT NULL,
                target_chapters INTEGER NOT NULL,
                chapters_per_arc INTEGER NOT NULL,
                current_chapter INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                model_id TEXT NOT NULL DEFAULT '',
                temperature REAL NOT NULL,
                target_chapter_words INTEGER NOT NULL,
                writing_style TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS world_state (
                project_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS plot_arcs (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                number INTEGER NOT NULL,
                title TEXT NOT NULL,
                theme TEXT NOT NULL,
                start_chapter INTEGER NOT NULL,
                end_chapter INTEGER NOT NULL,
                climax_chapter INTEGER NOT NULL,
                tension_curve TEXT NOT NULL,
                status TEXT NOT NULL,
                summary TEXT,
                UNIQUE (project_id, number)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chapters (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                number INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                word_count INTEGER NOT NULL,
                quality_score REAL NOT NULL DEFAULT 0,
                dopamine_points INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (project_id, number)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chapter_summaries (
                project_id TEXT NOT NULL,
                chapter_number INTEGER NOT NULL,
                summary TEXT NOT NULL,
                PRIMARY KEY (project_id, chapter_number)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                chapter_number INTEGER NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                step TEXT NOT NULL DEFAULT '',
                error TEXT,
                result_chapter_id TEXT,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                time_of_day TEXT NOT NULL,
                chapters_per_run INTEGER NOT NULL,
                status TEXT NOT NULL,
                next_run_at TIMESTAMP NOT NULL,
                last_run_at TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS character_tracker (
                project_id TEXT NOT NULL,
                character_name TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (project_id, character_name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS character_depth_profiles (
                project_id TEXT NOT NULL,
                character_name TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (project_id, character_name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS romance_progressions (
                project_id TEXT NOT NULL,
                character_a TEXT NOT NULL,
                character_b TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (project_id, character_a, character_b)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS power_progression (
                project_id TEXT NOT NULL,
                character_name TEXT NOT NULL,
                state TEXT NOT NULL,
                events TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (project_id, character_name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS canon_facts (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                chapter_introduced INTEGER NOT NULL,
                level TEXT NOT NULL,
                category TEXT NOT NULL,
                entities TEXT NOT NULL,
                statement TEXT NOT NULL,
                confidence REAL NOT NULL,
                last_reinforced_chapter INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS beat_usage (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                chapter_number INTEGER NOT NULL,
                arc_number INTEGER NOT NULL,
                beat_type TEXT NOT NULL,
                intensity INTEGER NOT NULL,
                cooldown_until INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tracked_items (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (project_id, name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS embedding_cache (
                project_id TEXT NOT NULL,
                text_hash TEXT NOT NULL,
                model_id TEXT NOT NULL,
                vector TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                PRIMARY KEY (project_id, text_hash)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rag_chunks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                chapter_number INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                vector TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS cost_tracking (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                timestamp TIMESTAMP NOT NULL,
                model_id TEXT NOT NULL,
                task TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS consistency_issues (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                chapter_number INTEGER NOT NULL,
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                description TEXT NOT NULL,
                fragment TEXT,
                suggested_fix TEXT
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects (owner_id)",
            "CREATE INDEX IF NOT EXISTS idx_chapters_project ON chapters (project_id, number)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_project ON jobs (project_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status)",
            "CREATE INDEX IF NOT EXISTS idx_canon_project ON canon_facts (project_id)",
            "CREATE INDEX IF NOT EXISTS idx_beats_project ON beat_usage (project_id, beat_type)",
            "CREATE INDEX IF NOT EXISTS idx_rag_project ON rag_chunks (project_id)",
            "CREATE INDEX IF NOT EXISTS idx_cost_project ON cost_tracking (project_id, timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_schedules_next ON schedules (status, next_run_at)",
        ];

        for index in indexes {
            sqlx::query(index).execute(&self.pool).await?;
        }

        tracing::info!("Database schema initialized");
        Ok(())
    }
}
