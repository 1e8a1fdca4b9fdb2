//! 模型句柄
//!
//! 模型只在第一次推理时加载，之后整个进程共享同一个实例。
//! 并发的首次请求只会触发一次加载，其余请求等待并拿到同一个句柄；
//! 加载失败不会缓存，下一次请求会重试。

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use super::vlm::{VlmConfig, VlmEngine, VlmError};

/// 图像问答模型
pub trait VqaModel: Send + Sync {
    /// 根据图片和问题生成答案（已去除首尾空白）
    fn generate<'a>(
        &'a self,
        image: &'a RgbImage,
        question: &'a str,
    ) -> BoxFuture<'a, Result<String>>;
}

/// 模型句柄提供者
pub trait ModelProvider: Send + Sync {
    /// 获取共享的模型句柄，必要时先加载
    fn model(&self) -> BoxFuture<'_, Result<Arc<dyn VqaModel>>>;

    /// 模型标识（用于日志和健康检查）
    fn model_name(&self) -> &str;
}

type Loader = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn VqaModel>>> + Send + Sync>;

/// 延迟加载、只加载一次的模型提供者
pub struct LazyModelProvider {
    name: String,
    loader: Loader,
    cell: OnceCell<Arc<dyn VqaModel>>,
}

impl LazyModelProvider {
    /// 使用自定义加载函数创建
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn VqaModel>>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            loader: Box::new(loader),
            cell: OnceCell::new(),
        }
    }

    /// 基于 OpenAI 兼容端点的 VLM 提供者
    ///
    /// 配置在这里校验；连接检查推迟到第一次请求。
    pub fn vlm(config: VlmConfig) -> Result<Self, VlmError> {
        let engine = VlmEngine::new(config)?;
        let name = engine.config().model.clone();

        Ok(Self::new(name, move || {
            let mut engine = engine.clone();
            async move {
                engine.initialize().await?;
                info!("VLM backend: {}", engine.backend_name());
                Ok(Arc::new(engine) as Arc<dyn VqaModel>)
            }
            .boxed()
        }))
    }

    /// 模型是否已加载
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

impl ModelProvider for LazyModelProvider {
    fn model(&self) -> BoxFuture<'_, Result<Arc<dyn VqaModel>>> {
        async move {
            let model = self
                .cell
                .get_or_try_init(|| async {
                    info!("Loading model '{}'", self.name);
                    (self.loader)()
                        .await
                        .with_context(|| format!("failed to load model '{}'", self.name))
                })
                .await?;
            Ok(Arc::clone(model))
        }
        .boxed()
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
