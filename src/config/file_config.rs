//! Configuration file discovery and persistence.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! batch_size = 5000
//! workers = 4
//!
//! [dedup]
//! similarity_threshold = 85
//! year_tolerance = 1
//! source_priority = ["crossref", "pubmed", "semantic"]
//!
//! [filters.types]
//! enabled = true
//! strict = false
//! allowed = ["journal", "conference"]
//!
//! [filters.keywords]
//! enabled = true
//! mode = "dual"
//! groups = [["machine learning", "ai"], ["health", "clinical"]]
//! bonus = ["transformer"]
//! fields = ["title", "abstract"]
//!
//! [filters.abstract_quality]
//! threshold = 60
//!
//! [filters.citations]
//! unresolved = "exempt"
//!
//! [filters.ranking]
//! max_papers = 500
//!
//! [cache]
//! enabled = true
//! directory = "~/.cache/research-corpus"
//! ttl_days = 30
//!
//! [resilience]
//! failure_threshold = 5
//! open_timeout_secs = 60
//! call_timeout_secs = 30
//! max_rate_limit_retries = 3
//!
//! [resilience.endpoints.primary]
//! schedule = "fixed"
//! base_delay = 1
//!
//! [resilience.endpoints.fallback]
//! schedule = "exponential"
//! base_delay = 2
//! max_delay = 60
//!
//! [citations]
//! concurrency = 3
//! mailto = "you@example.org"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use std::path::{Path, PathBuf};

use super::{Config, ConfigError};

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "research-corpus.toml";

/// Per-user configuration path, `<config dir>/research-corpus/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("research-corpus").join("config.toml"))
}

/// Find a configuration file: the working directory first, then the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    default_config_path().filter(|path| path.is_file())
}

/// Save configuration to a TOML file, creating parent directories
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
