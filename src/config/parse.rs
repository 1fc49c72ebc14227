use super::types::duration_format::format_duration;
use super::types::Config;
use crate::upload::retry::RetryPolicy;
use crate::config::{env_var_pattern, expand_env_vars};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file '{path}': {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("environment variable {0} must be set to the Amplitude API key")]
    MissingApiKey(String),
}

/// Load a config file, expanding `$env{VAR}` references before parsing.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse { source, .. } => ConfigError::YamlParse {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })
}

/// Parse config text. An empty document yields the defaults.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let config: Config = if yaml_string.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml_string).map_err(|source| ConfigError::YamlParse {
            path: "<inline>".to_string(),
            source,
        })?
    };

    validate_config(&config)?;
    Ok(config)
}

fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded: Vec<String> = env_var_pattern()
        .captures_iter(yaml_string)
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded.is_empty() {
        return Ok(());
    }

    unexpanded.sort();
    unexpanded.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables referenced by the config are not set: {}",
        unexpanded.join(", ")
    )))
}

/// Check every setting and report all problems at once.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
        errors.push(format!(
            "endpoint must be an http(s) URL, got '{}'",
            config.endpoint
        ));
    }
    if config.batch_size == 0 {
        errors.push("batch_size must be at least 1".to_string());
    }
    if config.concurrency == 0 {
        errors.push("concurrency must be at least 1".to_string());
    }
    if config.request_timeout.is_zero() {
        errors.push("request_timeout must be greater than zero".to_string());
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push("retry.max_attempts must be at least 1".to_string());
    }
    if retry.initial_delay.is_zero() {
        errors.push("retry.initial_delay must be greater than zero".to_string());
    }
    if retry.max_delay < retry.initial_delay {
        errors.push("retry.max_delay must not be shorter than retry.initial_delay".to_string());
    }
    if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
        errors.push(format!(
            "retry.backoff_multiplier must be at least 1.0, got {}",
            retry.backoff_multiplier
        ));
    }
    if retry.max_elapsed.is_zero() {
        errors.push("retry.max_elapsed must be greater than zero".to_string());
    } else if errors.is_empty() {
        let needed = RetryPolicy::from(retry).total_backoff();
        if needed > retry.max_elapsed {
            errors.push(format!(
                "retry.max_elapsed ({}) is shorter than the {} of backoff needed for {} attempts",
                format_duration(retry.max_elapsed),
                format_duration(needed),
                retry.max_attempts
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

/// Read the API key from `var_name`. Missing or blank is fatal.
pub fn load_api_key(var_name: &str) -> Result<String, ConfigError> {
    match std::env::var(var_name) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(ConfigError::MissingApiKey(var_name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::DEFAULT_ENDPOINT;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_document_is_default() {
        let config = parse_config("").unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.batch_size, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "batch_size: 250\nconcurrency: 8\nrequest_timeout: 10s\nretry:\n  jitter: false"
        )
        .unwrap();
        file.flush().unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(!config.retry.jitter);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config(Path::new("/nonexistent/amplitude-importer.yml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_env_expansion_in_endpoint() {
        std::env::set_var("AMP_IMPORT_PARSE_HOST", "http://localhost:9000");
        let config = parse_config("endpoint: $env{AMP_IMPORT_PARSE_HOST}/batch").unwrap();
        assert_eq!(config.endpoint, "http://localhost:9000/batch");
        std::env::remove_var("AMP_IMPORT_PARSE_HOST");
    }

    #[test]
    fn test_unexpanded_var_is_reported() {
        let err = parse_config("endpoint: $env{AMP_IMPORT_NOT_SET_ANYWHERE}").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("AMP_IMPORT_NOT_SET_ANYWHERE"));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let yaml = "endpoint: ftp://example.com\nbatch_size: 0\nconcurrency: 0\nretry:\n  max_attempts: 0\n  backoff_multiplier: 0.5";
        match parse_config(yaml) {
            Err(ConfigError::ValidationList(errors)) => {
                assert_eq!(errors.len(), 5);
                assert!(errors.iter().any(|e| e.contains("endpoint")));
                assert!(errors.iter().any(|e| e.contains("batch_size")));
                assert!(errors.iter().any(|e| e.contains("concurrency")));
                assert!(errors.iter().any(|e| e.contains("max_attempts")));
                assert!(errors.iter().any(|e| e.contains("backoff_multiplier")));
            }
            other => panic!("expected validation list, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_retry_budget_rejected() {
        match parse_config("retry:\n  max_elapsed: 0ms\n") {
            Err(ConfigError::ValidationList(errors)) => {
                assert_eq!(errors, vec!["retry.max_elapsed must be greater than zero"]);
            }
            other => panic!("expected validation list, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_budget_must_fit_every_attempt() {
        // Default curve sleeps 500ms+1s+2s+4s+8s+16s+30s*3 = 121.5s over ten attempts
        let err = parse_config("retry:\n  max_elapsed: 1s\n").unwrap_err();
        assert!(err.to_string().contains("121500ms of backoff needed for 10 attempts"));

        let config = parse_config("retry:\n  max_elapsed: 3m\n").unwrap();
        assert_eq!(config.retry.max_elapsed, Duration::from_secs(180));
    }

    #[test]
    fn test_bad_yaml() {
        let result = parse_config("batch_size: [not, a, number]");
        assert!(matches!(result, Err(ConfigError::YamlParse { .. })));
    }

    #[test]
    fn test_api_key_present() {
        std::env::set_var("AMP_IMPORT_TEST_KEY_PRESENT", " abc123 ");
        assert_eq!(load_api_key("AMP_IMPORT_TEST_KEY_PRESENT").unwrap(), "abc123");
        std::env::remove_var("AMP_IMPORT_TEST_KEY_PRESENT");
    }

    #[test]
    fn test_api_key_missing_or_blank() {
        let result = load_api_key("AMP_IMPORT_TEST_KEY_ABSENT");
        assert!(matches!(result, Err(ConfigError::MissingApiKey(name)) if name == "AMP_IMPORT_TEST_KEY_ABSENT"));

        std::env::set_var("AMP_IMPORT_TEST_KEY_BLANK", "   ");
        assert!(load_api_key("AMP_IMPORT_TEST_KEY_BLANK").is_err());
        std::env::remove_var("AMP_IMPORT_TEST_KEY_BLANK");
    }
}
