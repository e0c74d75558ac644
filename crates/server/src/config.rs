#![forbid(unsafe_code)]

use std::path::PathBuf;

/// Startup configuration, read from the environment once and injected
/// explicitly. Without an API base the server runs storage-only and the
/// generation tool reports a configuration failure instead.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub storage_dir: PathBuf,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let storage_dir = std::env::var("STORYLOOM_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./storyloom"));
        Self {
            storage_dir,
            api_base: non_empty_var("STORYLOOM_API_BASE"),
            api_key: non_empty_var("STORYLOOM_API_KEY"),
            model: non_empty_var("STORYLOOM_MODEL").unwrap_or_else(|| "default".to_string()),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
