use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub auth: AuthConfig,

    pub pairing: PairingConfig,

    pub voice: VoiceConfig,

    pub analyzer: AnalyzerConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,

    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/carelink.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 6780,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens. Override in production.
    pub token_secret: String,

    /// Caregiver session token TTL (interactive logins stay short).
    pub caregiver_token_ttl_minutes: i64,

    /// Dependent device token TTL. Long by design: the token replaces a
    /// persistent device pairing, not an interactive login.
    pub dependent_token_ttl_minutes: i64,

    /// Minimum accepted password length at signup.
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "carelink-dev-secret-change-me".to_string(),
            caregiver_token_ttl_minutes: 60,
            dependent_token_ttl_minutes: 24 * 60,
            min_password_length: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Pairing-code TTL; both entry points must resist guessing within it.
    pub code_ttl_minutes: i64,

    /// Length of the human-entry code for caregiver-initiated pairing
    /// (uppercase letters + digits).
    pub prebound_code_length: usize,

    /// Length of the one-time exchange secret (alphanumeric).
    pub exchange_code_length: usize,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            code_ttl_minutes: 15,
            prebound_code_length: 12,
            exchange_code_length: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Voice-session TTL in minutes (default: 60).
    pub session_ttl_minutes: i64,

    /// Directory holding the shared day-of question WAVs (a1.wav..aN.wav).
    /// Regenerated externally; this service only reads it.
    pub questions_root: String,

    /// Number of questions delivered per session.
    pub daily_questions_count: usize,

    /// Staging root for uploaded answers while analysis runs.
    pub media_root: String,

    /// Upper bound on answer files accepted per submission.
    pub max_answer_files: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 60,
            questions_root: "questions".to_string(),
            daily_questions_count: 3,
            media_root: "media".to_string(),
            max_answer_files: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// "remote" (HTTP analysis service) or "fixed" (in-process, dev/test).
    /// Selected once at startup; no runtime probing.
    pub mode: String,

    pub service_url: String,

    /// Per-submission analyzer timeout. Audio processing is slow; keep
    /// this generous (>= 60s recommended).
    pub request_timeout_seconds: u64,

    /// Score returned by the in-process "fixed" analyzer.
    pub fixed_score: f32,

    pub model_version: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            mode: "remote".to_string(),
            service_url: "http://localhost:8001".to_string(),
            request_timeout_seconds: 90,
            fixed_score: 0.0,
            model_version: "mci-vgg16-68.7".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Enables the low-priority purge of long-expired pairing codes and
    /// sessions. Pure storage hygiene; expiry is always enforced lazily at
    /// read time whether or not this runs.
    pub purge_enabled: bool,

    pub purge_interval_minutes: u64,

    /// Rows must be expired at least this long before the purge touches them.
    pub purge_grace_hours: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            purge_enabled: true,
            purge_interval_minutes: 60,
            purge_grace_hours: 24,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("carelink").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".carelink").join("config.toml"));
        }

        paths
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.token_secret.is_empty() {
            anyhow::bail!("auth.token_secret cannot be empty");
        }

        if self.pairing.code_ttl_minutes <= 0 {
            anyhow::bail!("pairing.code_ttl_minutes must be positive");
        }

        if self.voice.session_ttl_minutes <= 0 {
            anyhow::bail!("voice.session_ttl_minutes must be positive");
        }

        if self.voice.max_answer_files == 0 {
            anyhow::bail!("voice.max_answer_files must be at least 1");
        }

        match self.analyzer.mode.as_str() {
            "remote" | "fixed" => {}
            other => anyhow::bail!("analyzer.mode must be \"remote\" or \"fixed\", got \"{other}\""),
        }

        if self.analyzer.mode == "remote" && self.analyzer.service_url.is_empty() {
            anyhow::bail!("analyzer.service_url cannot be empty in remote mode");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            pairing: PairingConfig::default(),
            voice: VoiceConfig::default(),
            analyzer: AnalyzerConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}
