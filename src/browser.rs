use chromiumoxide::browser::{Browser as CrBrowser, BrowserConfig as CrBrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use tempfile::TempDir;

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::page::Page;

/// Chrome flags that improve performance without affecting functionality.
const PERF_ARGS: &[&str] = &[
    "disable-gpu",
    "disable-extensions",
    "metrics-recording-only",
    "mute-audio",
    "no-default-browser-check",
    "no-first-run",
    "disable-client-side-phishing-detection",
    "disable-popup-blocking",
    "disable-prompt-on-repost",
];

/// Additional Chrome flags for low-resource environments.
const LOW_RESOURCE_ARGS: &[&str] = &[
    "single-process",
    "disable-dev-shm-usage",
    "disable-software-rasterizer",
    "disable-gpu-compositing",
    "disable-background-networking",
    "disable-background-timer-throttling",
    "disable-renderer-backgrounding",
    "disable-backgrounding-occluded-windows",
    "disable-hang-monitor",
    "disable-sync",
    "disable-translate",
    "disable-domain-reliability",
    "no-zygote",
];

/// A single-use browser process with its own throwaway profile directory.
///
/// Nothing is shared between sessions: cookies, cache and storage live in
/// the profile directory, which is deleted when the session is dropped.
pub struct BrowserSession {
    browser: CrBrowser,
    config: BrowserConfig,
    _profile: TempDir,
    handler_task: tokio::task::JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a fresh browser process.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let profile = tempfile::Builder::new()
            .prefix("agentic-solver-profile-")
            .tempdir()?;

        let mut builder = CrBrowserConfig::builder().user_data_dir(profile.path());

        if config.headless {
            builder = builder.new_headless_mode().no_sandbox();
        } else {
            builder = builder.with_head().no_sandbox();
        }

        for arg in PERF_ARGS {
            builder = builder.arg(*arg);
        }

        if config.low_resource {
            for arg in LOW_RESOURCE_ARGS {
                builder = builder.arg(*arg);
            }
        }

        let heap_mb = config
            .js_heap_size_mb
            .or(config.low_resource.then_some(256));
        if let Some(heap_mb) = heap_mb {
            let js_flags = format!("--max-old-space-size={heap_mb}");
            builder = builder.arg(("js-flags", js_flags.as_str()));
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder = builder
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .launch_timeout(config.load_timeout);

        let cr_config = builder.build().map_err(Error::LaunchError)?;

        let (browser, mut handler) = CrBrowser::launch(cr_config)
            .await
            .map_err(|e| Error::LaunchError(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        tracing::debug!(profile = %profile.path().display(), "browser launched");

        Ok(Self {
            browser,
            config: config.clone(),
            _profile: profile,
            handler_task,
        })
    }

    /// Open a new tab and navigate it to `url`, bounded by the load timeout.
    pub async fn open(&self, url: &str) -> Result<Page> {
        let cr_page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?;

        let page = Page::new(cr_page, self.config.load_timeout);
        page.goto(url).await?;
        Ok(page)
    }

    /// Shut the browser down and reap the child process.
    ///
    /// Errors are logged rather than returned; the process is killed on
    /// drop regardless.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!(error = %e, "browser close command failed");
        }
        match tokio::time::timeout(self.config.load_timeout, self.browser.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "failed waiting for browser exit"),
            Err(_) => {
                tracing::warn!("browser did not exit in time, killing");
                let _ = self.browser.kill().await;
            }
        }
        self.handler_task.abort();
    }
}
