use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub query: QueryConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CTAS_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CTAS_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            query: QueryConfig::from_env_profiled(p),
        }
    }

    /// Same config, pointed at another region.
    pub fn with_region(&self, region: &str) -> Self {
        let mut cfg = self.clone();
        cfg.aws.region = region.to_string();
        cfg
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  aws:    region={}, endpoint={}",
            self.aws.region,
            self.aws.endpoint_url.as_deref().unwrap_or("(default)")
        );
        tracing::info!(
            "  query:  workgroup={}, timeout={}s, poll={}ms, temp_database={}",
            self.query.workgroup,
            self.query.timeout_seconds,
            self.query.poll_interval_ms,
            self.query.temp_database
        );
        tracing::info!(
            "  stage:  bucket={}",
            self.query.staging_bucket.as_deref().unwrap_or("(none)")
        );
    }

    /// Return a JSON view of the config (no credentials are held here).
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "aws": {
                "region": self.aws.region,
                "endpoint_url": self.aws.endpoint_url,
            },
            "query": {
                "workgroup": self.query.workgroup,
                "timeout_seconds": self.query.timeout_seconds,
                "poll_interval_ms": self.query.poll_interval_ms,
                "temp_database": self.query.temp_database,
                "staging_bucket": self.query.staging_bucket,
            },
        })
    }
}

// ── AWS ───────────────────────────────────────────────────────

/// Credentials are not configured here; the AWS default provider
/// chain supplies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        let region = profiled_env_opt(p, "ATHENA_REGION")
            .or_else(|| profiled_env_opt(p, "AWS_REGION"))
            .unwrap_or_else(|| "eu-west-1".to_string());
        Self {
            region,
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }
}

// ── Query lifecycle ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Athena workgroup queries are submitted to.
    pub workgroup: String,
    /// Deadline for a single query, in seconds.
    pub timeout_seconds: u64,
    /// Delay between two status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Catalog database holding the transient tables.
    pub temp_database: String,
    /// Default staging bucket (bucket name only).
    pub staging_bucket: Option<String>,
}

impl QueryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            workgroup: profiled_env_or(p, "ATHENA_WORKGROUP", "primary"),
            timeout_seconds: profiled_env_u64(p, "ATHENA_TIMEOUT_SECONDS", 300),
            poll_interval_ms: profiled_env_u64(p, "ATHENA_POLL_INTERVAL_MS", 1000),
            temp_database: profiled_env_or(p, "ATHENA_TEMP_DATABASE", "deleteme"),
            staging_bucket: profiled_env_opt(p, "ATHENA_STAGING_BUCKET"),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
