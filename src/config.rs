//! Startup configuration, read from the environment (after `.env`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

pub const DEFAULT_QWEN_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";
pub const DEFAULT_QWEN_MODEL: &str = "qwen-vl-max";
pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.siliconflow.cn/v1";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-ai/DeepSeek-V3";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_UPLOAD_MB: usize = 200;
const DEFAULT_SESSION_IDLE_MINUTES: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub qwen_key: String,
    pub qwen_base_url: String,
    pub qwen_model: String,
    pub deepseek_key: String,
    pub deepseek_base_url: String,
    pub deepseek_model: String,
    pub bind_addr: SocketAddr,
    pub prompt_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub session_idle: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} must be set (env or .env file)"));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let bind_addr = or_default("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("BIND_ADDR is not a socket address: {bind_addr}"))?;

        let max_upload_mb = match get("MAX_UPLOAD_MB") {
            Some(v) => v
                .parse::<usize>()
                .with_context(|| format!("MAX_UPLOAD_MB is not a number: {v}"))?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };
        if max_upload_mb == 0 {
            bail!("MAX_UPLOAD_MB must be at least 1");
        }
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow!("MAX_UPLOAD_MB is too large: {max_upload_mb}"))?;

        let idle_minutes = match get("SESSION_IDLE_MINUTES") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("SESSION_IDLE_MINUTES is not a number: {v}"))?,
            None => DEFAULT_SESSION_IDLE_MINUTES,
        };
        if idle_minutes == 0 {
            bail!("SESSION_IDLE_MINUTES must be at least 1");
        }
        let idle_secs = idle_minutes
            .checked_mul(60)
            .ok_or_else(|| anyhow!("SESSION_IDLE_MINUTES is too large: {idle_minutes}"))?;

        Ok(Self {
            qwen_key: required("QWEN_KEY")?,
            qwen_base_url: or_default("QWEN_BASE_URL", DEFAULT_QWEN_BASE_URL),
            qwen_model: or_default("QWEN_MODEL", DEFAULT_QWEN_MODEL),
            deepseek_key: required("DEEPSEEK_KEY")?,
            deepseek_base_url: or_default("DEEPSEEK_BASE_URL", DEFAULT_DEEPSEEK_BASE_URL),
            deepseek_model: or_default("DEEPSEEK_MODEL", DEFAULT_DEEPSEEK_MODEL),
            bind_addr,
            prompt_dir: get("PROMPT_DIR").map(PathBuf::from),
            max_upload_bytes,
            session_idle: Duration::from_secs(idle_secs),
        })
    }
}
