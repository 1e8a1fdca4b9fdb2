//! 配置管理模块
//!
//! 使用 TOML 文件存储配置，遵循 XDG 规范：
//! - Linux: ~/.config/vqa-demo/config.toml
//! - macOS: ~/Library/Application Support/com.vqa-demo.VqaDemo/config.toml
//! - Windows: %APPDATA%\vqa-demo\VqaDemo\config\config.toml
//!
//! 优先级：默认值 < 配置文件 < 环境变量 < 命令行参数。

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use crate::ai::vlm::VlmConfig;

/// 监听端口环境变量
pub const ENV_PORT: &str = "PORT";
/// 模型标识环境变量
pub const ENV_MODEL: &str = "VQA_MODEL";
/// 模型端点环境变量
pub const ENV_ENDPOINT: &str = "VQA_ENDPOINT";
/// API 密钥环境变量
pub const ENV_API_KEY: &str = "VQA_API_KEY";

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 同时处理的预测请求数，超出的排队等待
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// 上传大小上限（字节）
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    7860
}
fn default_concurrency() -> usize {
    2
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            concurrency: default_concurrency(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// 控制器配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// 强制使用占位控制器（不加载模型）
    #[serde(default)]
    pub placeholder: bool,
}

/// 应用配置（顶层结构）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP 服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// VLM 模型配置
    #[serde(default)]
    pub vlm: VlmConfig,
    /// 控制器配置
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl AppConfig {
    /// 获取配置目录路径
    pub fn config_dir() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("com", "vqa-demo", "VqaDemo") {
            Ok(proj_dirs.config_dir().to_path_buf())
        } else {
            // 回退到 ~/.vqa-demo
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot find home directory"))?;
            Ok(home.join(".vqa-demo"))
        }
    }

    /// 获取配置文件完整路径
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// 从文件加载配置
    ///
    /// 文件不存在时返回默认配置（不会创建文件）。
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from: {}", path.display());

        if !path.exists() {
            info!("Config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        info!("Config loaded from: {}", path.display());
        Ok(config)
    }

    /// 加载配置：指定路径优先，否则使用默认位置，然后应用环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load_from(&Self::config_path()?)?,
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 应用环境变量覆盖
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT).filter(|v| !v.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid {} value '{}'", ENV_PORT, port))?;
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.vlm.model = model.trim().to_string();
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            self.vlm.endpoint = endpoint.trim().to_string();
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.vlm.api_key = Some(key.trim().to_string());
        }
        Ok(())
    }

    /// 保存配置到文件
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let dir = path.parent().ok_or_else(|| anyhow!("Invalid config path"))?;

        // 确保目录存在
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
            debug!("Created config directory: {}", dir.display());
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, &content)?;

        // 设置文件权限 (Unix only) - 可能包含 API 密钥，仅用户可读写
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        info!("Config saved to: {}", path.display());
        Ok(())
    }
}
