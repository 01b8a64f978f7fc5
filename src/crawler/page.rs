use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

/// A loaded page the extractor can be run against.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: u64,
    pub url: String,
    pub html: String,
}

/// Opens and releases chapter pages. A freshly opened page is not
/// guaranteed to hold its final content, hence the settle delay.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<Page>;

    /// Reloads the content of an open page.
    async fn refresh(&self, page: &mut Page) -> Result<()>;

    async fn close(&self, page: Page);
}

pub struct HttpPageSource {
    client: Client,
    next_id: AtomicU64,
}

impl HttpPageSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(1),
        }
    }

    async fn get(&self, url: &str) -> Result<(String, String)> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let final_url = response.url().to_string();
        let html = response.text().await?;
        Ok((final_url, html))
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    #[instrument(skip(self))]
    async fn open(&self, url: &str) -> Result<Page> {
        let (final_url, html) = self.get(url).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("opened page {} ({} bytes)", id, html.len());
        Ok(Page {
            id,
            url: final_url,
            html,
        })
    }

    async fn refresh(&self, page: &mut Page) -> Result<()> {
        let (final_url, html) = self.get(&page.url).await?;
        page.url = final_url;
        page.html = html;
        Ok(())
    }

    async fn close(&self, page: Page) {
        debug!("closed page {}", page.id);
    }
}
