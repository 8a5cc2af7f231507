use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::analyzer::build_analyzer;
use crate::services::pairing::PairingService;
use crate::services::questions::{FsQuestionSource, QuestionSource};
use crate::services::session::SessionService;
use crate::services::token_issuer::TokenIssuer;

/// Shared HTTP client for outbound calls (the analyzer service). Reused so
/// connections pool instead of exhausting sockets.
fn build_shared_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("Carelink/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Config,

    pub store: Store,

    pub tokens: Arc<TokenIssuer>,

    pub pairing: Arc<PairingService>,

    pub sessions: Arc<SessionService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let http_client = build_shared_http_client()?;

        let tokens = Arc::new(TokenIssuer::new(
            &config.auth.token_secret,
            config.auth.caregiver_token_ttl_minutes,
            config.auth.dependent_token_ttl_minutes,
        ));

        let pairing = Arc::new(PairingService::new(
            store.clone(),
            tokens.clone(),
            config.pairing.clone(),
        ));

        let questions: Arc<dyn QuestionSource> = Arc::new(FsQuestionSource::new(
            config.voice.questions_root.clone(),
            config.voice.daily_questions_count,
        ));

        let analyzer: Arc<dyn crate::services::Analyzer> =
            Arc::from(build_analyzer(&config.analyzer, http_client));

        let sessions = Arc::new(SessionService::new(
            store.clone(),
            questions,
            analyzer,
            config.voice.clone(),
        ));

        Ok(Self {
            config,
            store,
            tokens,
            pairing,
            sessions,
        })
    }
}
