use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Remote file store connection settings
#[derive(Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub remote_dir: Option<String>,
}

impl std::fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("remote_dir", &self.remote_dir)
            .finish()
    }
}

/// Per-IP rate limit for the HTTP surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_second: u64,
    pub burst_size: u32,
    /// Key on `X-Forwarded-For` / `X-Real-IP`; only safe behind a trusted proxy
    pub trust_forwarded_headers: bool,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub store_timeout: Duration,
    pub staging_dir: PathBuf,
    pub artifact_extension: String,
    pub ftp: FtpConfig,
    pub delivery_timeout: Duration,
    pub claim_lease: Duration,
    pub max_code_bytes: usize,
    pub allowed_origins: Vec<String>,
    pub dispatch_schedule: Option<String>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let config = Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_or("PORT", 8080)?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 10)?,
            store_timeout: Duration::from_millis(parse_or("STORE_TIMEOUT_MS", 5_000)?),
            staging_dir: env::var("STAGING_DIR")
                .unwrap_or_else(|_| "./submission_dir".to_string())
                .into(),
            artifact_extension: env::var("ARTIFACT_EXTENSION")
                .map(|ext| ext.trim_start_matches('.').to_string())
                .unwrap_or_else(|_| "py".to_string()),
            ftp: FtpConfig {
                host: env::var("FTP_HOST").context("FTP_HOST must be set")?,
                port: parse_or("FTP_PORT", 21)?,
                user: env::var("FTP_USER").context("FTP_USER must be set")?,
                password: env::var("FTP_PASSWORD").context("FTP_PASSWORD must be set")?,
                remote_dir: env::var("FTP_REMOTE_DIR").ok().filter(|d| !d.is_empty()),
            },
            delivery_timeout: Duration::from_millis(parse_or("DELIVERY_TIMEOUT_MS", 30_000)?),
            claim_lease: Duration::from_millis(parse_or("CLAIM_LEASE_MS", 120_000)?),
            max_code_bytes: parse_or("MAX_CODE_BYTES", 1024 * 1024)?,
            allowed_origins: parse_origins(&env::var("ALLOWED_ORIGINS").unwrap_or_default()),
            dispatch_schedule: env::var("DISPATCH_SCHEDULE").ok().filter(|s| !s.is_empty()),
            rate_limit: parse_rate_limit(
                env::var("RATE_LIMIT_PER_SECOND").ok().as_deref(),
                env::var("RATE_LIMIT_BURST").ok().as_deref(),
                env::var("RATE_LIMIT_TRUST_PROXY").ok().as_deref(),
            )?,
        };
        check_claim_lease(
            config.claim_lease,
            config.delivery_timeout,
            config.store_timeout,
        )?;

        Ok(config)
    }
}

/// A claim must outlive the delivery bound plus one store round trip,
/// otherwise a concurrent trigger could recover it mid-upload.
pub fn check_claim_lease(
    claim_lease: Duration,
    delivery_timeout: Duration,
    store_timeout: Duration,
) -> Result<()> {
    anyhow::ensure!(
        claim_lease > delivery_timeout + store_timeout,
        "CLAIM_LEASE_MS ({}) must exceed DELIVERY_TIMEOUT_MS ({}) plus STORE_TIMEOUT_MS ({})",
        claim_lease.as_millis(),
        delivery_timeout.as_millis(),
        store_timeout.as_millis()
    );
    Ok(())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated origin list, dropping blanks. Empty means "any".
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rate limiting is enabled only when a per-second rate is given.
pub fn parse_rate_limit(
    per_second: Option<&str>,
    burst: Option<&str>,
    trust_proxy: Option<&str>,
) -> Result<Option<RateLimitConfig>> {
    let Some(per_second) = per_second.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let per_second: u64 = per_second
        .trim()
        .parse()
        .context("RATE_LIMIT_PER_SECOND must be a valid number")?;
    let burst_size: u32 = match burst.filter(|s| !s.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .context("RATE_LIMIT_BURST must be a valid number")?,
        None => (per_second as u32).saturating_mul(2),
    };
    anyhow::ensure!(
        per_second > 0 && burst_size > 0,
        "rate limit values must be positive"
    );

    let trust_forwarded_headers = match trust_proxy.map(str::trim).filter(|s| !s.is_empty()) {
        None => false,
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => anyhow::bail!("RATE_LIMIT_TRUST_PROXY must be true or false"),
        },
    };

    Ok(Some(RateLimitConfig {
        per_second,
        burst_size,
        trust_forwarded_headers,
    }))
}
