use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};
use crate::scans::repo_types::{NewScan, ScanRecord};

/// Persistence port for users and scan history.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Returns `None` when the email is already taken.
    async fn create_user(&self, user: NewUser) -> anyhow::Result<Option<User>>;
    /// Returns the number of rows updated.
    async fn update_password(&self, email: &str, password_hash: &str) -> anyhow::Result<u64>;
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;
    async fn insert_scan(&self, scan: NewScan) -> anyhow::Result<ScanRecord>;
    /// Most recent first.
    async fn list_scans(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<ScanRecord>>;
    async fn ping(&self) -> bool;
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    /// Applies `migrations/`; a failure is logged and startup continues.
    pub async fn migrate(&self) {
        if let Err(e) = sqlx::migrate!("./migrations").run(&self.pool).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";
const SCAN_COLUMNS: &str = "id, user_id, prediction, confidence, patient_name, patient_age, \
                            patient_gender, scanned_at";

#[async_trait]
impl Repository for PgRepository {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        // The unique constraint settles concurrent registrations for one address.
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> anyhow::Result<u64> {
        let res = sqlx::query("UPDATE users SET password_hash = $1 WHERE email = $2")
            .bind(password_hash)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn insert_scan(&self, scan: NewScan) -> anyhow::Result<ScanRecord> {
        let record = sqlx::query_as::<_, ScanRecord>(&format!(
            r#"
            INSERT INTO scan_history
                (id, user_id, prediction, confidence, patient_name, patient_age, patient_gender)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SCAN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(scan.user_id)
        .bind(&scan.prediction)
        .bind(scan.confidence)
        .bind(&scan.patient.name)
        .bind(&scan.patient.age)
        .bind(&scan.patient.gender)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_scans(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<ScanRecord>> {
        let rows = sqlx::query_as::<_, ScanRecord>(&format!(
            r#"
            SELECT {SCAN_COLUMNS}
            FROM scan_history
            WHERE user_id = $1
            ORDER BY scanned_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
