use std::env;
use std::path::PathBuf;

pub const LOG_ENV: &str = "NOTASD_LOG";
pub const WORKSPACE_ENV: &str = "NOTASD_WORKSPACE";

/// Process-level settings read once at startup. Grading thresholds are not
/// here: they belong to the workspace and live in its settings table.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub log_level: String,
    pub workspace: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_level = lookup(LOG_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "info".to_string());
        let workspace = lookup(WORKSPACE_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            log_level,
            workspace,
        }
    }
}
