use crate::errors::{AppError, AppResult};
use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;
use std::path::PathBuf;

/// Process configuration, extracted from the environment (after `.env`
/// loading). The two credentials are the only required values; a missing
/// one is the single fatal startup condition.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram_bot_token: String,
    pub anthropic_api_key: String,
    /// Allow-listed operator id. Unset means every sender is accepted.
    #[serde(default)]
    pub telegram_user_id: Option<i64>,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
    #[serde(default)]
    pub anthropic_model: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/factory.db")
}

fn default_port() -> u16 {
    3000
}

fn default_dashboard_url() -> String {
    "http://localhost:3000".to_string()
}

pub fn load() -> AppResult<Config> {
    Figment::new()
        .merge(Env::raw())
        .extract()
        .map_err(|err| AppError::Validation(format!("configuration error: {err}")))
}

#[cfg(test)]
mod tests {
    use super::Config;
    use figment::providers::Env;
    use figment::Figment;

    #[test]
    fn defaults_fill_in_around_required_credentials() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TELEGRAM_BOT_TOKEN", "token");
            jail.set_env("ANTHROPIC_API_KEY", "key");
            let config: Config = Figment::new().merge(Env::raw()).extract()?;
            assert_eq!(config.port, 3000);
            assert_eq!(config.dashboard_url, "http://localhost:3000");
            assert!(config.telegram_user_id.is_none());
            Ok(())
        });
    }

    #[test]
    fn missing_credentials_fail_extraction() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("TELEGRAM_BOT_TOKEN", "token");
            let result: Result<Config, _> = Figment::new().merge(Env::raw()).extract();
            assert!(result.is_err());
            Ok(())
        });
    }
}
