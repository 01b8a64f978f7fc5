use std::{collections::HashMap, path::Path, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use reqwest::{
    Client,
    cookie::Jar,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::Deserialize;
use url::Url;

use crate::extractor::Strategy;

pub static CONFIG_FILE: &str = "config.toml";

static ENV_PREFIX: &str = "COMICK";

#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the output tree; chapter folders land in `<output_dir>/<title>/`.
    pub output_dir: PathBuf,
    pub delays: DelaySettings,
    pub http: HttpConfig,
    pub auth: Option<AuthType>,
    pub site: SiteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("Manga"),
            delays: DelaySettings::default(),
            http: HttpConfig::default(),
            auth: None,
            site: SiteConfig::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Token(String),
    Cookies(HashMap<String, String>),
}

impl Config {
    /// Loads `path` when it exists, then applies `COMICK_*` overrides.
    /// A missing file leaves every setting at its default.
    pub fn load(path: &Path) -> Result<Self> {
        config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("failed to deserialize {}: {}", path.display(), e))
    }

    pub fn get_jar(&self) -> Result<Arc<Jar>> {
        let jar = Jar::default();
        if let Some(AuthType::Cookies(cookies)) = &self.auth {
            let base = Url::parse(&self.site.base_url)?;
            let host = base.host_str().ok_or_else(|| {
                anyhow::anyhow!("site base_url has no host: {}", self.site.base_url)
            })?;
            let url = Url::parse(&format!("{}://{}", base.scheme(), host))?;
            for (key, value) in cookies {
                jar.add_cookie_str(&format!("{}={}", key, value), &url);
            }
        }
        Ok(Arc::new(jar))
    }

    pub fn http_client(&self) -> Result<Client> {
        let mut headers = HeaderMap::new();
        if let Some(AuthType::Token(token)) = &self.auth {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        let user_agent = match &self.http.user_agent {
            Some(ua) => ua.clone(),
            None => ua_generator::ua::spoof_ua().to_owned(),
        };

        let client = Client::builder()
            .cookie_provider(self.get_jar()?)
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .build()?;
        Ok(client)
    }
}

/// Pacing between pipeline steps, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DelaySettings {
    pub page_load_delay: f64,
    pub image_delay: f64,
    pub chapter_delay: f64,
    /// Extra settle rounds granted to a chapter page that shows no images yet.
    pub settle_retries: u32,
}

const DEFAULT_PAGE_LOAD_DELAY: f64 = 10.0;
const DEFAULT_IMAGE_DELAY: f64 = 2.0;
const DEFAULT_CHAPTER_DELAY: f64 = 10.0;

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            page_load_delay: DEFAULT_PAGE_LOAD_DELAY,
            image_delay: DEFAULT_IMAGE_DELAY,
            chapter_delay: DEFAULT_CHAPTER_DELAY,
            settle_retries: 0,
        }
    }
}

impl DelaySettings {
    /// All waits set to zero. Handy for tests and local mirrors.
    pub fn immediate() -> Self {
        Self {
            page_load_delay: 0.0,
            image_delay: 0.0,
            chapter_delay: 0.0,
            settle_retries: 0,
        }
    }

    pub fn page_load(&self) -> Duration {
        seconds(self.page_load_delay, DEFAULT_PAGE_LOAD_DELAY)
    }

    pub fn image(&self) -> Duration {
        seconds(self.image_delay, DEFAULT_IMAGE_DELAY)
    }

    pub fn chapter(&self) -> Duration {
        seconds(self.chapter_delay, DEFAULT_CHAPTER_DELAY)
    }
}

fn seconds(value: f64, fallback: f64) -> Duration {
    if value.is_finite() && value >= 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::from_secs_f64(fallback)
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: None,
        }
    }
}

/// Page-specific scraping rules for the target site.
#[derive(Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub chapter_links: String,
    pub title: String,
    pub episode_items: String,
    pub chapter_heading: String,
    /// Extraction cascade; the built-in one is used when absent.
    pub strategies: Option<Vec<Box<dyn Strategy>>>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://comick.io".to_owned(),
            chapter_links: r#"a[href*="/comic/"][href*="chapter"]"#.to_owned(),
            title: "h1".to_owned(),
            episode_items: ".episode-item".to_owned(),
            chapter_heading: ".flex.items-center.justify-between h2".to_owned(),
            strategies: None,
        }
    }
}
