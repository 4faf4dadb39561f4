use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use dbanalyst_utils::error::ConfigError;

use super::{
    CONFIG_PATH_ENV, CliArgs, Config, ConfigSource, DatabaseConfig, Defaults, LlmConfig,
    PROVIDER_ENV, ReceiptsConfig,
};

/// Keys whose default value is attributed to `ConfigSource::Default`
pub(crate) const DEFAULTED_KEYS: &[&str] = &[
    "max_attempts",
    "on_exhausted",
    "completion_timeout",
    "query_timeout",
    "max_plan_steps",
    "max_context_rows",
    "verbose",
    "llm_provider",
];

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
struct TomlConfig {
    defaults: Option<Defaults>,
    database: Option<DatabaseConfig>,
    llm: Option<LlmConfig>,
    receipts: Option<ReceiptsConfig>,
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory as the starting point of the
    /// upward search.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("cannot read current directory: {e}"),
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut source_attribution: HashMap<String, ConfigSource> = DEFAULTED_KEYS
            .iter()
            .map(|key| (key.to_string(), ConfigSource::Default))
            .collect();

        let mut defaults = Defaults::default();
        let mut database = DatabaseConfig::default();
        let mut llm = LlmConfig::default();
        let mut receipts = ReceiptsConfig::default();

        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => match env::var_os(CONFIG_PATH_ENV) {
                Some(from_env) if !from_env.is_empty() => Some(PathBuf::from(from_env)),
                _ => Self::discover_config_file_from(start_dir)?,
            },
        };

        if let Some(path) = &config_path {
            tracing::debug!(path = %path.display(), "Loading config file");
            let file_config = Self::load_config_file(path)?;
            let base_dir = config_base_dir(path);
            let source = ConfigSource::Config;

            if let Some(file_defaults) = file_config.defaults {
                if file_defaults.max_attempts.is_some() {
                    defaults.max_attempts = file_defaults.max_attempts;
                    source_attribution.insert("max_attempts".to_string(), source);
                }
                if file_defaults.on_exhausted.is_some() {
                    defaults.on_exhausted = file_defaults.on_exhausted;
                    source_attribution.insert("on_exhausted".to_string(), source);
                }
                if file_defaults.completion_timeout.is_some() {
                    defaults.completion_timeout = file_defaults.completion_timeout;
                    source_attribution.insert("completion_timeout".to_string(), source);
                }
                if file_defaults.query_timeout.is_some() {
                    defaults.query_timeout = file_defaults.query_timeout;
                    source_attribution.insert("query_timeout".to_string(), source);
                }
                if file_defaults.max_plan_steps.is_some() {
                    defaults.max_plan_steps = file_defaults.max_plan_steps;
                    source_attribution.insert("max_plan_steps".to_string(), source);
                }
                if file_defaults.max_context_rows.is_some() {
                    defaults.max_context_rows = file_defaults.max_context_rows;
                    source_attribution.insert("max_context_rows".to_string(), source);
                }
                if file_defaults.verbose.is_some() {
                    defaults.verbose = file_defaults.verbose;
                    source_attribution.insert("verbose".to_string(), source);
                }
            }

            if let Some(file_database) = file_config.database
                && let Some(db_path) = file_database.path
            {
                database.path = Some(resolve_relative(&base_dir, db_path));
                source_attribution.insert("database_path".to_string(), source);
            }

            if let Some(file_llm) = file_config.llm {
                if file_llm.provider.is_some() {
                    llm.provider = file_llm.provider;
                    source_attribution.insert("llm_provider".to_string(), source);
                }
                if file_llm.fallback_provider.is_some() {
                    llm.fallback_provider = file_llm.fallback_provider;
                    source_attribution.insert("llm_fallback_provider".to_string(), source);
                }
                if file_llm.model.is_some() {
                    llm.model = file_llm.model;
                    source_attribution.insert("llm_model".to_string(), source);
                }
                if file_llm.anthropic.is_some() {
                    llm.anthropic = file_llm.anthropic;
                    source_attribution.insert("llm_anthropic_config".to_string(), source);
                }
                if file_llm.openrouter.is_some() {
                    llm.openrouter = file_llm.openrouter;
                    source_attribution.insert("llm_openrouter_config".to_string(), source);
                }
            }

            if let Some(file_receipts) = file_config.receipts
                && let Some(dir) = file_receipts.dir
            {
                receipts.dir = Some(resolve_relative(&base_dir, dir));
                source_attribution.insert("receipts_dir".to_string(), source);
            }
        }

        // Provider precedence: CLI > env > config > default
        if let Ok(env_provider) = env::var(PROVIDER_ENV)
            && !env_provider.is_empty()
        {
            llm.provider = Some(env_provider);
            source_attribution.insert("llm_provider".to_string(), ConfigSource::Cli);
        }

        if let Some(provider) = &cli_args.llm_provider {
            llm.provider = Some(provider.clone());
            source_attribution.insert("llm_provider".to_string(), ConfigSource::Cli);
        }
        if let Some(model) = &cli_args.model {
            llm.model = Some(model.clone());
            source_attribution.insert("llm_model".to_string(), ConfigSource::Cli);
        }
        if let Some(db_path) = &cli_args.db_path {
            database.path = Some(db_path.clone());
            source_attribution.insert("database_path".to_string(), ConfigSource::Cli);
        }
        if let Some(max_attempts) = cli_args.max_attempts {
            defaults.max_attempts = Some(max_attempts);
            source_attribution.insert("max_attempts".to_string(), ConfigSource::Cli);
        }
        if let Some(on_exhausted) = cli_args.on_exhausted {
            defaults.on_exhausted = Some(on_exhausted);
            source_attribution.insert("on_exhausted".to_string(), ConfigSource::Cli);
        }
        if let Some(verbose) = cli_args.verbose {
            defaults.verbose = Some(verbose);
            source_attribution.insert("verbose".to_string(), ConfigSource::Cli);
        }

        let config = Self {
            defaults,
            database,
            llm,
            receipts,
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }

    /// Discover config file by searching upward from a given directory
    ///
    /// Walks up the directory tree looking for `.dbanalyst/config.toml`,
    /// stopping at repository root markers (.git, .hg, .svn) or the
    /// filesystem root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
        let mut current_dir = Some(start_dir);

        while let Some(dir) = current_dir {
            let config_path = dir.join(".dbanalyst").join("config.toml");
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }

            current_dir = dir.parent();
        }

        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::InvalidFile(format!("{}: {e}", path.display()))
            }),
            // A named but missing file means "defaults only"
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(TomlConfig::default())
            }
            Err(e) => Err(ConfigError::InvalidFile(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Project directory for a config file: the parent of `.dbanalyst/`, or the
/// file's own directory for config files kept elsewhere.
fn config_base_dir(config_path: &Path) -> PathBuf {
    let parent = config_path.parent().unwrap_or_else(|| Path::new("."));
    if parent.file_name().is_some_and(|name| name == ".dbanalyst") {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

fn resolve_relative(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_base_dir() {
        assert_eq!(
            config_base_dir(Path::new("/proj/.dbanalyst/config.toml")),
            PathBuf::from("/proj")
        );
        assert_eq!(
            config_base_dir(Path::new("/etc/dbanalyst.toml")),
            PathBuf::from("/etc")
        );
    }

    #[test]
    fn test_resolve_relative_keeps_absolute_paths() {
        let base = Path::new("/proj");
        assert_eq!(
            resolve_relative(base, PathBuf::from("/abs/db.sqlite")),
            PathBuf::from("/abs/db.sqlite")
        );
        assert_eq!(
            resolve_relative(base, PathBuf::from("db.sqlite")),
            PathBuf::from("/proj/db.sqlite")
        );
    }
}
