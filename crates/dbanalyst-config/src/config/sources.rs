use std::collections::BTreeMap;

use dbanalyst_utils::types::ConfigSource;

use super::Config;

fn source_label(source: Option<&ConfigSource>) -> String {
    source.copied().unwrap_or(ConfigSource::Default).to_string()
}

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add_config = |key: &str, value: Option<String>| {
            if let Some(val) = value {
                let source = source_label(self.source_attribution.get(key));
                config.insert(key.to_string(), (val, source));
            }
        };

        add_config("max_attempts", Some(self.max_attempts().to_string()));
        add_config("on_exhausted", Some(self.on_exhausted().to_string()));
        add_config(
            "completion_timeout",
            Some(format!("{}s", self.completion_timeout().as_secs())),
        );
        add_config(
            "query_timeout",
            Some(format!("{}s", self.query_timeout().as_secs())),
        );
        add_config("max_plan_steps", Some(self.max_plan_steps().to_string()));
        add_config(
            "max_context_rows",
            Some(self.max_context_rows().to_string()),
        );
        add_config("verbose", Some(self.verbose().to_string()));
        add_config(
            "database_path",
            self.database.path.as_ref().map(|p| p.display().to_string()),
        );
        add_config("llm_provider", Some(self.llm_provider().to_string()));
        add_config("llm_fallback_provider", self.llm.fallback_provider.clone());
        add_config("llm_model", self.llm.model.clone());
        add_config(
            "receipts_dir",
            self.receipts.dir.as_ref().map(|p| p.display().to_string()),
        );

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_config_reports_sources() {
        let config = Config::builder()
            .max_attempts(4)
            .database_path("/data/app.db")
            .build()
            .unwrap();

        let effective = config.effective_config();
        assert_eq!(
            effective.get("max_attempts"),
            Some(&("4".to_string(), "programmatic".to_string()))
        );
        assert_eq!(
            effective.get("query_timeout"),
            Some(&("30s".to_string(), "default".to_string()))
        );
        assert!(effective.contains_key("database_path"));
        assert!(!effective.contains_key("receipts_dir"));
    }
}
