use super::{types::Config, ConfigError, API_KEY_PLACEHOLDER};

/// Validate configuration.
///
/// Collects every problem and reports them together so a single edit pass
/// can fix the file.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut issues: Vec<String> = Vec::new();

    let api_key = config.lidarr.api_key.trim();
    if api_key.is_empty() || api_key.contains(API_KEY_PLACEHOLDER) {
        issues.push("lidarr.api_key is missing or still the placeholder".to_string());
    }

    for (name, url) in [
        ("lidarr.base_url", &config.lidarr.base_url),
        ("probe.target_base_url", &config.probe.target_base_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            issues.push(format!("{} must be an http(s) URL", name));
        }
    }

    if config.lidarr.timeout_secs < 1 {
        issues.push("lidarr.timeout_secs must be >= 1".to_string());
    }
    if config.probe.timeout_secs < 1 {
        issues.push("probe.timeout_secs must be >= 1".to_string());
    }
    let rate = config.probe.rate_limit_per_second;
    if !(rate > 0.0 && rate.is_finite()) {
        issues.push("probe.rate_limit_per_second must be a finite number > 0".to_string());
    }
    if config.probe.max_concurrent_requests < 1 {
        issues.push("probe.max_concurrent_requests must be >= 1".to_string());
    }

    for (name, budget) in [
        ("probe.max_attempts_per_artist", config.probe.max_attempts_per_artist),
        (
            "probe.max_attempts_per_artist_textsearch",
            config.probe.max_attempts_per_artist_textsearch,
        ),
        ("probe.max_attempts_per_rg", config.probe.max_attempts_per_rg),
    ] {
        if budget < 1 {
            issues.push(format!("{} must be >= 1", name));
        }
    }

    if config.run.batch_write_frequency < 1 {
        issues.push("run.batch_write_frequency must be >= 1".to_string());
    }
    if config.schedule.interval_secs < 1 {
        issues.push("schedule.interval_secs must be >= 1".to_string());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(issues.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[lidarr]
base_url = "http://lidarr:8686"
api_key = "0123456789abcdef"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_placeholder_key_fails() {
        let mut config = valid_config();
        config.lidarr.api_key = API_KEY_PLACEHOLDER.to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_validate_reports_all_issues() {
        let mut config = valid_config();
        config.probe.target_base_url = "ftp://nope".to_string();
        config.probe.rate_limit_per_second = 0.0;
        config.probe.max_concurrent_requests = 0;
        config.probe.max_attempts_per_rg = 0;

        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("probe.target_base_url"));
        assert!(message.contains("rate_limit_per_second"));
        assert!(message.contains("max_concurrent_requests"));
        assert!(message.contains("max_attempts_per_rg"));
    }

    #[test]
    fn test_validate_non_finite_rate_fails() {
        for rate in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -1.0] {
            let mut config = valid_config();
            config.probe.rate_limit_per_second = rate;
            let err = validate_config(&config).unwrap_err();
            assert!(
                err.to_string().contains("rate_limit_per_second"),
                "rate {} was accepted",
                rate
            );
        }
    }
}
