use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::entities::{analyses, dependents, pairing_codes, voice_sessions};

pub mod migrator;
pub mod repositories;

pub use repositories::analysis::NewAnalysis;
pub use repositories::dependent::NewDependent;
pub use repositories::user::User;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") && !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn dependent_repo(&self) -> repositories::dependent::DependentRepository {
        repositories::dependent::DependentRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn pairing_repo(&self) -> repositories::pairing::PairingRepository {
        repositories::pairing::PairingRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn session_repo(&self) -> repositories::session::SessionRepository {
        repositories::session::SessionRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn analysis_repo(&self) -> repositories::analysis::AnalysisRepository {
        repositories::analysis::AnalysisRepository::new(self.conn.clone())
    }

    // ========== User helpers ==========

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
        phone: Option<String>,
        security: &SecurityConfig,
    ) -> Result<User> {
        self.user_repo()
            .create(email, name, password, phone, security)
            .await
    }

    pub async fn verify_user_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        self.user_repo().verify_password(email, password).await
    }

    // ========== Dependent helpers ==========

    pub async fn get_dependent(&self, id: i32) -> Result<Option<dependents::Model>> {
        self.dependent_repo().get(id).await
    }

    pub async fn get_owned_dependent(
        &self,
        id: i32,
        caregiver_id: i32,
    ) -> Result<Option<dependents::Model>> {
        self.dependent_repo().get_owned(id, caregiver_id).await
    }

    // ========== Pairing helpers ==========

    pub async fn get_pairing_code(&self, code: &str) -> Result<Option<pairing_codes::Model>> {
        self.pairing_repo().get_by_code(code).await
    }

    // ========== Session helpers ==========

    pub async fn get_session_for_dependent(
        &self,
        session_id: i32,
        dependent_id: i32,
    ) -> Result<Option<voice_sessions::Model>> {
        self.session_repo()
            .get_for_dependent(session_id, dependent_id)
            .await
    }

    // ========== Analysis helpers ==========

    pub async fn analysis_history(&self, dependent_id: i32) -> Result<Vec<analyses::Model>> {
        self.analysis_repo()
            .history_for_dependent(dependent_id)
            .await
    }
}
