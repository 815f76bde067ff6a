use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Lifetime of cached main feed pages in seconds, 0 disables the cache
    #[serde(default = "default_index_cache_seconds")]
    pub index_cache_seconds: u64,
    #[serde(default = "default_session_hours")]
    pub session_hours: i64,
    /// How often expired sessions are purged, in minutes
    #[serde(default = "default_session_sweep_minutes")]
    pub session_sweep_minutes: u64,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// Ten years
pub const MAX_SESSION_HOURS: i64 = 24 * 365 * 10;
/// One week
pub const MAX_SESSION_SWEEP_MINUTES: u64 = 60 * 24 * 7;

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_database_url() -> String {
    "sqlite:postboard.db?mode=rwc".to_string()
}

fn default_index_cache_seconds() -> u64 {
    20
}

fn default_session_hours() -> i64 {
    24 * 14
}

fn default_session_sweep_minutes() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_SESSION_HOURS).contains(&self.session_hours) {
            anyhow::bail!(
                "session_hours must be between 1 and {}, got {}",
                MAX_SESSION_HOURS,
                self.session_hours
            );
        }
        if !(1..=MAX_SESSION_SWEEP_MINUTES).contains(&self.session_sweep_minutes) {
            anyhow::bail!(
                "session_sweep_minutes must be between 1 and {}, got {}",
                MAX_SESSION_SWEEP_MINUTES,
                self.session_sweep_minutes
            );
        }

        let mut seen = HashSet::new();
        for group in &self.groups {
            if !is_valid_slug(&group.slug) {
                anyhow::bail!(
                    "group '{}' has an invalid slug '{}': use letters, digits, '-' or '_'",
                    group.title,
                    group.slug
                );
            }
            if !seen.insert(group.slug.as_str()) {
                anyhow::bail!("duplicate group slug '{}'", group.slug);
            }
        }
        Ok(())
    }
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
