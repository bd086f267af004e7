//! Page rendering: load a URL in a fresh browser, let it settle, read it.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::BrowserConfig;
use crate::error::Result;

/// What a challenge page looked like once it finished loading.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub visible_text: String,
    /// Compressed JPEG of the viewport, when captured.
    pub screenshot: Option<Vec<u8>>,
}

impl PageSnapshot {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            visible_text: text.into(),
            screenshot: None,
        }
    }
}

/// Turns a URL into a [`PageSnapshot`].
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<PageSnapshot>;
}

/// Renders pages in headless Chrome, one browser process per call.
pub struct ChromeRenderer {
    config: BrowserConfig,
}

impl ChromeRenderer {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    async fn capture(&self, session: &BrowserSession, url: &str) -> Result<PageSnapshot> {
        let page = session.open(url).await?;

        let idle = page
            .wait_for_network_idle(self.config.network_idle, self.config.load_timeout)
            .await?;
        if !idle {
            debug!(url, "network never went idle, continuing");
        }
        tokio::time::sleep(self.config.settle_delay).await;

        let visible_text = page.visible_text().await?;

        let screenshot = if self.config.capture_screenshot {
            match page.screenshot_jpeg(self.config.screenshot_quality).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    // Text alone is still usable.
                    warn!(url, error = %e, "screenshot failed");
                    None
                }
            }
        } else {
            None
        };

        if let Ok(final_url) = page.url().await {
            if final_url != url {
                debug!(url, final_url = %final_url, "page redirected");
            }
        }

        Ok(PageSnapshot {
            visible_text,
            screenshot,
        })
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<PageSnapshot> {
        let session = BrowserSession::launch(&self.config).await?;
        let result = self.capture(&session, url).await;
        session.close().await;

        let snapshot = result?;
        info!(
            url,
            chars = snapshot.visible_text.len(),
            screenshot_bytes = snapshot.screenshot.as_ref().map_or(0, Vec::len),
            "page rendered"
        );
        Ok(snapshot)
    }
}
