use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::core::registry::DEFAULT_ECHARTS_URL;
use crate::core::renderer::RendererOptions;
use crate::core::uploads::UploadRoots;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_env")]
    pub env: String, // file / server
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub prefix: Option<String>,

    #[serde(default = "default_center_upload_dir")]
    pub center_upload_dir: PathBuf,
    #[serde(default = "default_label_upload_dir")]
    pub label_upload_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_cleanup_after_render")]
    pub cleanup_after_render: bool,
    #[serde(default = "default_render_width")]
    pub render_width: u32,
    #[serde(default = "default_render_height")]
    pub render_height: u32,
    #[serde(default = "default_echarts_url")]
    pub echarts_url: String,
}

fn default_env() -> String {
    "file".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_center_upload_dir() -> PathBuf {
    PathBuf::from("uploads/center")
}

fn default_label_upload_dir() -> PathBuf {
    PathBuf::from("uploads/labels")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("graphs/tmp")
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("graphs/templates")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_cleanup_after_render() -> bool {
    true
}

fn default_render_width() -> u32 {
    1080
}

fn default_render_height() -> u32 {
    1350
}

fn default_echarts_url() -> String {
    DEFAULT_ECHARTS_URL.to_string()
}

impl Config {
    pub fn upload_roots(&self) -> UploadRoots {
        UploadRoots {
            center_dir: self.center_upload_dir.clone(),
            label_dir: self.label_upload_dir.clone(),
        }
    }

    pub fn renderer_options(&self) -> Result<RendererOptions> {
        let echarts_url = Url::parse(&self.echarts_url)
            .with_context(|| format!("invalid echarts_url: {}", self.echarts_url))?;
        Ok(RendererOptions {
            output_dir: self.output_dir.clone(),
            template_dir: self.template_dir.clone(),
            width: self.render_width,
            height: self.render_height,
            echarts_url,
        })
    }
}

pub fn get_config() -> Result<Config> {
    let env_var = env::var("env").unwrap_or("file".to_string());
    if env_var == "file" {
        info!("using .env file as environtment variable");
        let _ = dotenvy::dotenv();
    } else {
        info!("using server environtment as environtment variable");
    }
    envy::from_env::<Config>().context("failed to load configuration from environment")
}
