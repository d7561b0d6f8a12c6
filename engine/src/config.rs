use std::time::Duration;

/// Engine configuration, loaded from environment variables with defaults.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Domain used to derive synthetic identifiers from usernames
    pub username_domain: String,
    /// Upper bound for any single provider or store call, in seconds
    pub call_timeout_secs: u64,
    /// Whether new guest accounts get the starter folders
    pub seed_starter_folders: bool,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        Self {
            username_domain: std::env::var("MEMOZ_USERNAME_DOMAIN")
                .unwrap_or_else(|_| "memoz.app".to_string()),
            call_timeout_secs: std::env::var("MEMOZ_CALL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            seed_starter_folders: std::env::var("MEMOZ_STARTER_FOLDERS")
                .ok()
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            username_domain: "memoz.app".to_string(),
            call_timeout_secs: 10,
            seed_starter_folders: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.username_domain, "memoz.app");
        assert_eq!(config.call_timeout(), Duration::from_secs(10));
        assert!(config.seed_starter_folders);
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("MEMOZ_USERNAME_DOMAIN", "example.test");
        std::env::set_var("MEMOZ_CALL_TIMEOUT_SECS", "3");
        let config = CoreConfig::from_env();
        assert_eq!(config.username_domain, "example.test");
        assert_eq!(config.call_timeout_secs, 3);
        std::env::remove_var("MEMOZ_USERNAME_DOMAIN");
        std::env::remove_var("MEMOZ_CALL_TIMEOUT_SECS");
    }

    #[test]
    fn test_starter_folder_flag_parses_false() {
        std::env::set_var("MEMOZ_STARTER_FOLDERS", "0");
        assert!(!CoreConfig::from_env().seed_starter_folders);
        std::env::set_var("MEMOZ_STARTER_FOLDERS", "false");
        assert!(!CoreConfig::from_env().seed_starter_folders);
        std::env::remove_var("MEMOZ_STARTER_FOLDERS");
    }
}
