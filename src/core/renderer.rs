use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use headless_chrome::Tab;
use headless_chrome::{Browser, LaunchOptions, protocol::cdp::Page};
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::core::dispatcher::{PosterRenderer, RenderJob};
use crate::core::poster::DEFAULT_TEMPLATE_NAME;
use crate::core::registry::FAMILY_REGISTRY;
use crate::core::template::{self, PageAssets};

struct TabGuard {
    tab: Arc<Tab>,
}

impl TabGuard {
    fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    fn as_ref(&self) -> &Arc<Tab> {
        &self.tab
    }
}

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(true) {
            tracing::warn!("Failed to close tab during cleanup: {}", e);
        } else {
            tracing::debug!("Tab closed successfully");
        }
    }
}

#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub output_dir: PathBuf,
    pub template_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub echarts_url: Url,
}

/// Draws posters as ECharts pages in headless Chrome and saves PNG
/// screenshots under `output_dir`.
#[derive(Clone)]
pub struct ChromeRenderer {
    browser: Arc<Mutex<Option<Browser>>>,
    launch_options: LaunchOptions<'static>,
    options: RendererOptions,
}

impl ChromeRenderer {
    pub fn new(options: RendererOptions) -> Result<Self> {
        std::fs::create_dir_all(&options.output_dir)?;

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some((options.width, options.height)))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-setuid-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-software-rasterizer"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-networking"),
                OsStr::new("--disable-sync"),
                OsStr::new("--metrics-recording-only"),
                OsStr::new("--mute-audio"),
                OsStr::new("--no-first-run"),
                OsStr::new("--disable-default-apps"),
                OsStr::new("--hide-scrollbars"),
            ])
            .build()
            .map_err(|_| anyhow!("Could not find Chrome/Chromium binary"))?;

        Ok(Self {
            browser: Arc::new(Mutex::new(None)),
            launch_options,
            options,
        })
    }

    fn get_or_create_browser(&self) -> Result<Browser> {
        let mut browser_lock = self.browser.lock();

        // Check if browser exists and is alive
        if let Some(ref browser) = *browser_lock {
            match browser.new_tab() {
                Ok(tab) => {
                    let _ = tab.close(true);
                    return Ok(browser.clone());
                }
                Err(_) => {
                    tracing::warn!("Browser health check failed, recreating");
                    *browser_lock = None;
                }
            }
        }

        tracing::info!("Launching headless browser");
        let new_browser = Browser::new(self.launch_options.clone())?;
        *browser_lock = Some(new_browser.clone());

        Ok(new_browser)
    }

    /// Inlines every image the page needs as data URIs.
    fn page_assets(&self, job: &RenderJob) -> PageAssets {
        let common = job.common();
        let background = data_uri(&background_path(&self.options.template_dir, &common.template_name));
        let center_image = common
            .center_image
            .as_deref()
            .filter(|p| !p.is_empty())
            .and_then(|p| data_uri(Path::new(p)));
        let label_images = match job {
            RenderJob::Bar(bar) => bar
                .label_images
                .iter()
                .flatten()
                .map(|slot| {
                    slot.as_deref()
                        .filter(|p| !p.is_empty())
                        .and_then(|p| data_uri(Path::new(p)))
                })
                .collect(),
            _ => Vec::new(),
        };
        let footer_date = common
            .date_str
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| chrono::Local::now().format("%b %d, %Y").to_string());

        PageAssets {
            background,
            center_image,
            label_images,
            footer_date,
            width: self.options.width,
            height: self.options.height,
            echarts_url: self.options.echarts_url.to_string(),
        }
    }

    fn render_sync(&self, job: &RenderJob) -> Result<PathBuf> {
        let assets = self.page_assets(job);
        let html = template::generate_html(job, &assets)?;

        let browser = self.get_or_create_browser().or_else(|e| {
            tracing::warn!("First browser creation failed: {}, retrying...", e);
            // Force clear and retry once
            *self.browser.lock() = None;
            self.get_or_create_browser()
        })?;
        let tab = browser.new_tab()?;
        let tab_guard = TabGuard::new(tab);
        let tab = tab_guard.as_ref();

        tab.set_bounds(headless_chrome::types::Bounds::Normal {
            left: Some(0),
            top: Some(0),
            width: Some(self.options.width as f64),
            height: Some(self.options.height as f64),
        })?;

        let data_url = format!(
            "data:text/html;base64,{}",
            general_purpose::STANDARD.encode(&html)
        );
        tab.navigate_to(&data_url)?;

        let family = FAMILY_REGISTRY
            .get(&job.poster_type())
            .ok_or_else(|| anyhow!("Unsupported poster type: {}", job.poster_type()))?;

        tab.wait_for_element_with_custom_timeout(&family.wait_selector, Duration::from_secs(10))?;

        self.wait_for_render_ready(tab)?;

        let png = tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)?;

        let out = self.options.output_dir.join(format!(
            "{}_{}.png",
            job.poster_type(),
            Uuid::new_v4().simple()
        ));
        std::fs::write(&out, png)?;

        Ok(out)
    }

    fn wait_for_render_ready(&self, tab: &Arc<Tab>) -> Result<()> {
        let mut attempts = 0;
        const MAX_ATTEMPTS: u32 = 50;
        const POLL_INTERVAL_MS: u64 = 100;
        let poll_interval = Duration::from_millis(POLL_INTERVAL_MS);

        while attempts < MAX_ATTEMPTS {
            let ready: bool = tab
                .evaluate("window.renderReady === true", false)?
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            if ready {
                tracing::debug!("Render ready after {} attempts", attempts);
                break;
            }

            let error: Option<String> = tab
                .evaluate("window.renderError", false)?
                .value
                .and_then(|v| v.as_str().map(String::from));

            if let Some(err) = error {
                return Err(anyhow!("Render initialization failed: {}", err));
            }

            sleep(poll_interval);
            attempts += 1;
        }

        if attempts >= MAX_ATTEMPTS {
            return Err(anyhow!(
                "Timeout waiting for render to complete after {} attempts",
                MAX_ATTEMPTS
            ));
        }

        // Let the canvas flush its last frame.
        sleep(poll_interval);

        Ok(())
    }
}

impl PosterRenderer for ChromeRenderer {
    fn render(&self, job: &RenderJob) -> Result<PathBuf> {
        self.render_sync(job)
    }
}

/// `<template_dir>/<name>_template.png`, falling back to the main template
/// for names that are not plain identifiers.
pub fn background_path(template_dir: &Path, template_name: &str) -> PathBuf {
    let valid = !template_name.is_empty()
        && template_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let name = if valid { template_name } else { DEFAULT_TEMPLATE_NAME };
    template_dir.join(format!("{}_template.png", name))
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "image/png",
    }
}

fn data_uri(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(format!(
            "data:{};base64,{}",
            mime_type(path),
            general_purpose::STANDARD.encode(bytes)
        )),
        Err(e) => {
            tracing::warn!(event = "poster_asset_missing", path = %path.display(), error = %e);
            None
        }
    }
}
