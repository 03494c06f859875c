#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::config::*;

    const MINIMAL: &str = r#"
        [telegram]
        bot_token = "123:abc"

        [access]
        user_id = 42
        chat_id = -100123

        [downloads]
        destination_dir = "/srv/downloads"
    "#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_file_fills_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.request_timeout_secs, 1800);
        assert!(config.telegram.api_url.is_none());
        assert_eq!(config.access, AccessConfig { user_id: 42, chat_id: -100123 });
        assert_eq!(config.downloads.destination_dir, PathBuf::from("/srv/downloads"));
        assert_eq!(config.downloads.max_retries, 5);
        assert_eq!(config.downloads.initial_retry_delay_secs, 5);
        assert_eq!(config.downloads.progress_interval_secs, 10);
        assert_eq!(config.downloads.status_page_size, 2);
        assert_eq!(config.health.port, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        let policy = config.downloads.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_secs(5));
        assert_eq!(config.downloads.progress_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_env_reads_all_variables() {
        let config = Config::from_env_with(env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("USER_ID", "42"),
            ("CHAT_ID", "-100123"),
            ("DOWNLOAD_TO_DIR", "/srv/downloads"),
            ("DOWNLOAD_TEMP_DIR", "/srv/tmp"),
            ("BOT_API_DIR", "/var/lib/telegram-bot-api"),
            ("TELEGRAM_API_URL", "http://localhost:8081"),
            ("HEALTH_CHECK_PORT", "9000"),
        ]))
        .unwrap();

        assert_eq!(config.access.user_id, 42);
        assert_eq!(config.access.chat_id, -100123);
        assert_eq!(config.downloads.temp_dir, PathBuf::from("/srv/tmp"));
        assert_eq!(
            config.downloads.local_api_dir,
            Some(PathBuf::from("/var/lib/telegram-bot-api"))
        );
        assert_eq!(config.telegram.api_url.as_deref(), Some("http://localhost:8081"));
        assert_eq!(config.health.port, 9000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_requires_operator_ids() {
        let err = Config::from_env_with(env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("DOWNLOAD_TO_DIR", "/srv/downloads"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("USER_ID"));
    }

    #[test]
    fn test_from_env_rejects_non_numeric_ids() {
        let err = Config::from_env_with(env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("USER_ID", "alice"),
            ("CHAT_ID", "1"),
            ("DOWNLOAD_TO_DIR", "/srv/downloads"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("USER_ID"));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.downloads.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_local_dir_without_local_server() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.downloads.local_api_dir = Some(PathBuf::from("/var/lib/telegram-bot-api"));
        assert!(config.validate().is_err());

        config.telegram.api_url = Some("http://localhost:8081".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_api_url() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.telegram.api_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }
}
