use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Maximum connections in the Postgres pool.
    pub db_max_connections: u32,
    /// Requests taking longer are cancelled (and their transactions rolled back).
    pub request_timeout_secs: u64,
    /// Interval of the background lead-score refresh; 0 disables it.
    pub lead_refresh_interval_secs: u64,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| validate_database_url(&url).map(|_| url))?,
            port: parse_var("PORT", 3000)
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 10).and_then(|n: u32| {
                if n == 0 {
                    anyhow::bail!("DB_MAX_CONNECTIONS must be at least 1");
                }
                Ok(n)
            })?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", 30).and_then(|n: u64| {
                if n == 0 {
                    anyhow::bail!("REQUEST_TIMEOUT_SECS must be at least 1");
                }
                Ok(n)
            })?,
            lead_refresh_interval_secs: parse_var("LEAD_REFRESH_INTERVAL_SECS", 0)?,
            rate_limit_per_second: parse_var("RATE_LIMIT_PER_SECOND", 10).and_then(|n: u64| {
                if n == 0 {
                    anyhow::bail!("RATE_LIMIT_PER_SECOND must be at least 1");
                }
                Ok(n)
            })?,
            rate_limit_burst: parse_var("RATE_LIMIT_BURST", 20).and_then(|n: u32| {
                if n == 0 {
                    anyhow::bail!("RATE_LIMIT_BURST must be at least 1");
                }
                Ok(n)
            })?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!("Request timeout: {}s", config.request_timeout_secs);
        if config.lead_refresh_interval_secs > 0 {
            tracing::info!(
                "Background lead refresh every {}s",
                config.lead_refresh_interval_secs
            );
        }

        Ok(config)
    }
}

/// Reads an optional numeric variable, falling back to `default` when unset or blank.
fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", name)),
        _ => Ok(default),
    }
}

fn validate_database_url(url: &str) -> anyhow::Result<()> {
    if url.trim().is_empty() {
        anyhow::bail!("DB_URL cannot be empty");
    }
    let parsed =
        url::Url::parse(url).map_err(|e| anyhow::anyhow!("DB_URL is not a valid URL: {}", e))?;
    if parsed.scheme() != "postgresql" && parsed.scheme() != "postgres" {
        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
    }
    Ok(())
}
