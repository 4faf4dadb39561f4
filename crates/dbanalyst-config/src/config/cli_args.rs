use std::path::PathBuf;

use super::OnExhausted;

/// Command-line overrides fed into [`Config::discover`](super::Config::discover)
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub llm_provider: Option<String>,
    pub model: Option<String>,
    pub max_attempts: Option<u32>,
    pub on_exhausted: Option<OnExhausted>,
    pub verbose: Option<bool>,
}
