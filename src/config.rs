use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub app_origin: String,
    #[serde(default)]
    pub stripe_publishable_key: Option<String>,
    pub request_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub max_files: usize,
    pub refresh_margin_secs: u64,
    #[serde(default)]
    pub token_store_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            app_origin: DEFAULT_APP_ORIGIN.to_string(),
            stripe_publishable_key: None,
            request_timeout_secs: 60,
            upload_timeout_secs: 7200,
            max_files: 5,
            refresh_margin_secs: 300,
            token_store_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            api_base_url: env::var("SECURESHARE_API_BASE_URL")
                .or_else(|_| env::var("VITE_API_BASE_URL"))
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            app_origin: env::var("SECURESHARE_APP_ORIGIN")
                .unwrap_or_else(|_| DEFAULT_APP_ORIGIN.to_string()),
            stripe_publishable_key: env::var("SECURESHARE_STRIPE_PUBLISHABLE_KEY")
                .or_else(|_| env::var("VITE_STRIPE_PUBLISHABLE_KEY"))
                .ok(),
            request_timeout_secs: env::var("SECURESHARE_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            upload_timeout_secs: env::var("SECURESHARE_UPLOAD_TIMEOUT_SECS")
                .unwrap_or_else(|_| "7200".to_string()) // 2 hours
                .parse()?,
            max_files: env::var("SECURESHARE_MAX_FILES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            refresh_margin_secs: env::var("SECURESHARE_REFRESH_MARGIN_SECS")
                .unwrap_or_else(|_| "300".to_string()) // 5 minutes
                .parse()?,
            token_store_path: env::var("SECURESHARE_TOKEN_STORE_PATH").ok(),
        })
    }

    /// Loads a TOML/JSON/YAML file with `SECURESHARE_*` environment overrides on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let defaults = Config::default();
        let settings = config::Config::builder()
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default("app_origin", defaults.app_origin)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("upload_timeout_secs", defaults.upload_timeout_secs)?
            .set_default("max_files", defaults.max_files as u64)?
            .set_default("refresh_margin_secs", defaults.refresh_margin_secs)?
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("SECURESHARE"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}
