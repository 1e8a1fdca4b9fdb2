//! 视觉语言模型 (VLM) 引擎模块
//!
//! 使用 OpenAI 兼容 API 回答关于图片的问题。
//! 支持本地服务（vLLM、Ollama、LM Studio）和远程服务（OpenAI、Together AI、OpenRouter 等）。

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures::future::BoxFuture;
use futures::FutureExt;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::model::VqaModel;

/// 默认模型标识（小型 VQA 模型）
pub const DEFAULT_MODEL: &str = "Qwen/Qwen2-VL-2B-Instruct";

/// 默认端点（本地 vLLM）
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/v1";

/// 发送前的最大图片尺寸
const MAX_IMAGE_WIDTH: u32 = 1280;
const MAX_IMAGE_HEIGHT: u32 = 720;

/// VLM 引擎错误
#[derive(Debug, Error)]
pub enum VlmError {
    /// 端点地址无效
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// HTTP 客户端构建失败
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// 引擎未初始化
    #[error("VLM engine not initialized")]
    NotReady,

    /// 网络错误
    #[error("failed to reach model endpoint: {0}")]
    Transport(#[from] reqwest::Error),

    /// API 返回非成功状态
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// 响应中没有答案
    #[error("model returned no answer")]
    EmptyResponse,

    /// 图片编码失败
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

/// VLM 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlmConfig {
    /// API 端点（如 http://127.0.0.1:8000/v1 或 https://api.openai.com/v1）
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// 模型名称
    #[serde(default = "default_model")]
    pub model: String,
    /// API 密钥（远程服务需要）
    #[serde(default)]
    pub api_key: Option<String>,
    /// 最大输出 tokens（答案很短，保持较小）
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// 温度参数
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// 请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    20
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for VlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl VlmConfig {
    /// 去掉结尾斜杠的端点
    fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// VLM 引擎
#[derive(Clone)]
pub struct VlmEngine {
    config: VlmConfig,
    client: reqwest::Client,
    is_ready: bool,
}

impl VlmEngine {
    /// 创建新的 VLM 引擎
    ///
    /// 只校验配置，不访问网络；连接检查在 [`VlmEngine::initialize`] 中进行。
    pub fn new(config: VlmConfig) -> Result<Self, VlmError> {
        reqwest::Url::parse(config.base_url()).map_err(|e| VlmError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(VlmError::Client)?;

        Ok(Self {
            config,
            client,
            is_ready: false,
        })
    }

    /// 初始化引擎（验证端点可用）
    pub async fn initialize(&mut self) -> Result<(), VlmError> {
        if self.is_ready {
            return Ok(());
        }

        info!("Initializing VLM engine...");
        info!("  Endpoint: {}", self.config.endpoint);
        info!("  Model: {}", self.config.model);

        let url = format!("{}/models", self.config.base_url());
        let mut req = self.client.get(&url);

        if let Some(ref key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        info!("VLM endpoint is ready");
        self.is_ready = true;
        Ok(())
    }

    /// 回答关于图片的问题
    pub async fn answer(&self, image: &RgbImage, question: &str) -> Result<String, VlmError> {
        if !self.is_ready {
            return Err(VlmError::NotReady);
        }

        let image_base64 = Self::encode_image(image)?;
        self.call_api(&image_base64, question).await
    }

    /// 调用 OpenAI 兼容 API
    async fn call_api(&self, image_base64: &str, question: &str) -> Result<String, VlmError> {
        let request = serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/jpeg;base64,{}", image_base64)
                        }
                    },
                    {
                        "type": "text",
                        "text": Self::build_prompt(question)
                    }
                ]
            }],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature
        });

        let url = format!("{}/chat/completions", self.config.base_url());

        info!(
            "VLM API Request: model={}, max_tokens={}, image_size={}KB",
            self.config.model,
            self.config.max_tokens,
            image_base64.len() / 1024
        );
        debug!("VLM API URL: {}", url);

        let start_time = Instant::now();

        let mut req = self.client.post(&url).json(&request);

        if let Some(ref key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await?;
        let status = response.status();

        info!(
            "VLM API Response: status={}, elapsed={:.2}s",
            status,
            start_time.elapsed().as_secs_f64()
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("VLM API Error: status={}, body={}", status, body);
            return Err(VlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: serde_json::Value = response.json().await?;
        Self::parse_answer(&result)
    }

    /// 编码图片为 base64 JPEG
    fn encode_image(image: &RgbImage) -> Result<String, VlmError> {
        let mut buffer = Cursor::new(Vec::new());

        // 缩放大图，保持宽高比
        let image = image::DynamicImage::ImageRgb8(image.clone());
        let image = if image.width() > MAX_IMAGE_WIDTH || image.height() > MAX_IMAGE_HEIGHT {
            image.resize(
                MAX_IMAGE_WIDTH,
                MAX_IMAGE_HEIGHT,
                image::imageops::FilterType::Triangle,
            )
        } else {
            image
        };

        image.write_to(&mut buffer, image::ImageFormat::Jpeg)?;
        Ok(BASE64.encode(buffer.into_inner()))
    }

    /// 构建问答 Prompt
    fn build_prompt(question: &str) -> String {
        format!(
            "Answer the question about the image with a short phrase.\nQuestion: {}\nAnswer:",
            question
        )
    }

    /// 从 chat completion 响应中取出答案
    fn parse_answer(result: &serde_json::Value) -> Result<String, VlmError> {
        let content = result["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(VlmError::EmptyResponse)?;

        debug!("VLM API Response content length: {} chars", content.len());

        Ok(content.trim().to_string())
    }

    /// 获取后端名称
    pub fn backend_name(&self) -> String {
        if self.config.endpoint.contains("openai.com") {
            "OpenAI".to_string()
        } else if self.config.endpoint.contains("11434") {
            "Ollama".to_string()
        } else if self.config.endpoint.contains("8000") {
            "vLLM".to_string()
        } else {
            format!("Custom ({})", self.config.endpoint)
        }
    }

    /// 获取配置
    pub fn config(&self) -> &VlmConfig {
        &self.config
    }
}

impl VqaModel for VlmEngine {
    fn generate<'a>(
        &'a self,
        image: &'a RgbImage,
        question: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<String>> {
        async move { Ok(self.answer(image, question).await?) }.boxed()
    }
}
