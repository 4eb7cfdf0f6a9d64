//! Runtime settings: built-in defaults, then an optional TOML file, then
//! `SKINS__*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "skins_scraper.toml";
const ENV_PREFIX: &str = "SKINS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub fetch: FetchSettings,
    pub retry: RetrySettings,
    pub selectors: SelectorSettings,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Catalog sweep output, also the default enrichment input.
    pub items: PathBuf,
    pub images: PathBuf,
    pub checkpoint_db: PathBuf,
    pub records_export: PathBuf,
    pub pending_export: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub page_timeout_ms: u64,
    pub image_timeout_ms: u64,
    pub user_agent: String,
    pub accept_language: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    pub listing_item: String,
    pub listing_name: String,
    pub listing_price: String,
    pub listing_image: String,
    /// Attribute on the item element holding its detail link.
    pub listing_link_attr: String,
    pub detail_wrapper: String,
    pub detail_title: String,
    pub detail_wear: String,
    pub detail_text: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    /// Listing URL prefix; the page number is appended.
    pub url: String,
    pub pages: u32,
}

impl Category {
    pub fn page_url(&self, page: u32) -> String {
        format!("{}{}", self.url, page)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            paths: PathSettings::default(),
            fetch: FetchSettings::default(),
            retry: RetrySettings::default(),
            selectors: SelectorSettings::default(),
            categories: vec![Category {
                name: "Rust".into(),
                url: "https://lis-skins.com/ru/market/rust/?page=".into(),
                pages: 57,
            }],
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            items: "items.json".into(),
            images: "images".into(),
            checkpoint_db: "data/checkpoint.sqlite".into(),
            records_export: "items_complete.json".into(),
            pending_export: "items_pending.json".into(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            page_timeout_ms: 60_000,
            image_timeout_ms: 30_000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .into(),
            accept_language: "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7".into(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: 2,
            min_delay_ms: 100,
            max_delay_ms: 200,
        }
    }
}

impl Default for SelectorSettings {
    fn default() -> Self {
        SelectorSettings {
            listing_item: ".item.market_item".into(),
            listing_name: ".name-inner".into(),
            listing_price: ".price".into(),
            listing_image: "img.image".into(),
            listing_link_attr: "data-link".into(),
            detail_wrapper: "#skin-description-wrapper .section-block.about-block".into(),
            detail_title: "h2.block-name".into(),
            detail_wear: "span p:nth-child(1)".into(),
            detail_text: r#"[itemprop="description"]"#.into(),
        }
    }
}

impl FetchSettings {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }
}

impl Settings {
    /// Load settings. An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.min_delay_ms > self.retry.max_delay_ms {
            anyhow::bail!(
                "retry.min_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.min_delay_ms,
                self.retry.max_delay_ms
            );
        }
        Ok(())
    }
}
