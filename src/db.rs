use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{Document, StudentRecord, UserCredential};

/// Persistence for user credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        profile: &Document,
    ) -> anyhow::Result<Uuid>;

    /// Inserts only when no record with this username exists. The check and
    /// the insert are atomic. Returns `None` when the name is taken.
    async fn insert_unique_user(
        &self,
        username: &str,
        password_hash: &str,
        profile: &Document,
    ) -> anyhow::Result<Option<Uuid>>;

    /// Oldest record with this username, if any.
    async fn find_user(&self, username: &str) -> anyhow::Result<Option<UserCredential>>;
}

/// Persistence for student records. Every call is scoped by `owner`.
#[async_trait]
pub trait StudentStore: Send + Sync {
    async fn list_students(&self, owner: Uuid) -> anyhow::Result<Vec<StudentRecord>>;

    async fn insert_student(&self, owner: Uuid, fields: &Document) -> anyhow::Result<Uuid>;

    async fn find_student(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<StudentRecord>>;

    /// Merges `fields` into the record. Returns whether a record matched.
    async fn update_student(&self, owner: Uuid, id: Uuid, fields: &Document)
        -> anyhow::Result<bool>;

    /// Returns whether a record was removed.
    async fn delete_student(&self, owner: Uuid, id: Uuid) -> anyhow::Result<bool>;
}

pub trait Storage: CredentialStore + StudentStore {}

impl<T: CredentialStore + StudentStore> Storage for T {}

/// Shared handle, created once at startup.
pub type Store = Arc<dyn Storage>;

pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await
        .context("Could not connect to the database")?;
    prepare(&pool).await?;
    Ok(pool)
}

/// Creates the tables on first start.
pub async fn prepare(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            username TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            profile JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Could not create `users` table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS users_username_idx ON users (username)")
        .execute(pool)
        .await
        .context("Could not create `users` index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS students (
            id UUID PRIMARY KEY,
            owner_id UUID NOT NULL,
            fields JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Could not create `students` table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS students_owner_idx ON students (owner_id)")
        .execute(pool)
        .await
        .context("Could not create `students` index")?;
    Ok(())
}

pub struct PgStore {
    pg: PgPool,
}

impl PgStore {
    pub fn new(pg: PgPool) -> Self {
        Self { pg }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        profile: &Document,
    ) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, profile, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(username)
        .bind(password_hash)
        .bind(Json(profile))
        .bind(Utc::now())
        .execute(&self.pg)
        .await
        .context("Could not save user")?;
        Ok(id)
    }

    async fn insert_unique_user(
        &self,
        username: &str,
        password_hash: &str,
        profile: &Document,
    ) -> anyhow::Result<Option<Uuid>> {
        let mut tx = self.pg.begin().await.context("Could not begin transaction")?;
        // serializes registrations of the same name until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(username)
            .execute(&mut *tx)
            .await
            .context("Could not lock username")?;

        let id = Uuid::new_v4();
        let res = sqlx::query(
            "INSERT INTO users (id, username, password_hash, profile, created_at)
             SELECT $1, $2, $3, $4, $5
             WHERE NOT EXISTS (SELECT 1 FROM users WHERE username = $2)",
        )
        .bind(id)
        .bind(username)
        .bind(password_hash)
        .bind(Json(profile))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Could not save user")?;
        tx.commit().await.context("Could not commit user")?;

        Ok((res.rows_affected() >= 1).then_some(id))
    }

    async fn find_user(&self, username: &str) -> anyhow::Result<Option<UserCredential>> {
        let user = sqlx::query_as::<_, UserCredential>(
            "SELECT id, username, password_hash FROM users
             WHERE username = $1 ORDER BY created_at LIMIT 1",
        )
        .bind(username)
        .fetch_optional(&self.pg)
        .await
        .context("Could not look up user")?;
        Ok(user)
    }
}

#[async_trait]
impl StudentStore for PgStore {
    async fn list_students(&self, owner: Uuid) -> anyhow::Result<Vec<StudentRecord>> {
        let students = sqlx::query_as::<_, StudentRecord>(
            "SELECT id, owner_id, fields FROM students WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(&self.pg)
        .await
        .context("Could not list students")?;
        Ok(students)
    }

    async fn insert_student(&self, owner: Uuid, fields: &Document) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO students (id, owner_id, fields, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(owner)
        .bind(Json(fields))
        .bind(Utc::now())
        .execute(&self.pg)
        .await
        .context("Could not save student")?;
        Ok(id)
    }

    async fn find_student(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<StudentRecord>> {
        let student = sqlx::query_as::<_, StudentRecord>(
            "SELECT id, owner_id, fields FROM students WHERE id = $1 AND owner_id = $2 LIMIT 1",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pg)
        .await
        .context("Could not read student")?;
        Ok(student)
    }

    async fn update_student(
        &self,
        owner: Uuid,
        id: Uuid,
        fields: &Document,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE students SET fields = fields || $3 WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner)
        .bind(Json(fields))
        .execute(&self.pg)
        .await
        .context("Could not update student")?;
        Ok(res.rows_affected() >= 1)
    }

    async fn delete_student(&self, owner: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM students WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pg)
            .await
            .context("Could not delete student")?;
        Ok(res.rows_affected() >= 1)
    }
}
