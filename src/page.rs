use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::Page as CrPage;
use chromiumoxide::page::ScreenshotParams;

use crate::element::Element;
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wrapper around a chromiumoxide Page exposing only what rendering needs.
pub struct Page {
    inner: CrPage,
    timeout: Duration,
}

impl Page {
    pub(crate) fn new(inner: CrPage, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    // ── Navigation ──────────────────────────────────────────────────

    /// Navigate to the given URL and wait for the load event.
    pub async fn goto(&self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.inner.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Error::NavigationError(e.to_string())),
            Err(_) => Err(Error::Timeout(format!("navigation to {url}"))),
        }
    }

    /// Get the current page URL.
    pub async fn url(&self) -> Result<String> {
        self.inner
            .url()
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?
            .ok_or_else(|| Error::NavigationError("No URL found".into()))
    }

    // ── Waiting ─────────────────────────────────────────────────────

    /// Wait until the number of fetched resources stops changing for `idle`.
    ///
    /// Returns `true` if the page went quiet and `false` if `timeout` ran out
    /// first. Running out is not an error: long-polling pages never go idle.
    pub async fn wait_for_network_idle(&self, idle: Duration, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        let mut last_count = self.resource_count().await?;
        let mut stable_since = Instant::now();

        while start.elapsed() < timeout {
            tokio::time::sleep(POLL_INTERVAL).await;
            let count = self.resource_count().await?;
            if count != last_count {
                last_count = count;
                stable_since = Instant::now();
            } else if stable_since.elapsed() >= idle {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn resource_count(&self) -> Result<u64> {
        let result = self
            .inner
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        result
            .into_value::<u64>()
            .map_err(|e| Error::JsError(e.to_string()))
    }

    /// Wait for an element matching the given CSS selector to appear in the DOM.
    /// Polls every 100ms up to the page timeout.
    pub async fn wait_for_selector(&self, selector: &str) -> Result<Element> {
        let start = Instant::now();

        loop {
            match self.find_element(selector).await {
                Ok(el) => return Ok(el),
                Err(_) if start.elapsed() < self.timeout => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(_) => {
                    return Err(Error::Timeout(format!(
                        "Timed out waiting for selector: {}",
                        selector
                    )));
                }
            }
        }
    }

    // ── Observations ────────────────────────────────────────────────

    /// Visible text of the document body, as a user would read it.
    pub async fn visible_text(&self) -> Result<String> {
        let body = self.wait_for_selector("body").await?;
        match body.inner_text().await {
            Ok(text) => Ok(text),
            Err(Error::ElementNotFound(_)) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Take a JPEG screenshot of the viewport at the given quality (0-100).
    pub async fn screenshot_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(i64::from(quality.min(100)))
            .build();
        self.inner
            .screenshot(params)
            .await
            .map_err(|e| Error::ScreenshotError(e.to_string()))
    }

    /// Find an element matching the given CSS selector.
    pub async fn find_element(&self, selector: &str) -> Result<Element> {
        let el = self
            .inner
            .find_element(selector)
            .await
            .map_err(|e| Error::ElementNotFound(e.to_string()))?;
        Ok(Element::new(el))
    }
}
