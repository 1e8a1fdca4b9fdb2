//! 策略控制器
//!
//! 根据请求的来源选择策略，再调用底层模型回答问题。
//! 当前所有来源最终都走 baseline 推理；门控和记忆检索尚未接入。

pub mod strategy;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ai::{LazyModelProvider, ModelProvider};
use crate::config::AppConfig;

pub use strategy::{
    BaselineGate, ControllerSource, DistilledGate, Strategy, StrategyGate, StrategyResult,
};

/// 模型不可用时返回的占位答案
pub const PLACEHOLDER_ANSWER: &str = "Placeholder answer (wire your models in controller.py).";

/// 回答 VQA 请求的能力
pub trait Controller: Send + Sync {
    /// 回答问题，返回 (答案, 策略名, 策略编号)
    fn answer<'a>(
        &'a self,
        image: &'a RgbImage,
        question: &'a str,
        source: ControllerSource,
        distilled: DistilledGate,
    ) -> BoxFuture<'a, Result<StrategyResult>>;

    /// 后端名称（用于健康检查）
    fn backend(&self) -> &str;

    /// 使用的模型标识
    fn model_name(&self) -> Option<&str> {
        None
    }
}

/// 基于真实模型的控制器
pub struct ModelController {
    provider: Arc<dyn ModelProvider>,
    gate: Arc<dyn StrategyGate>,
}

impl ModelController {
    /// 使用默认门控（总是 baseline）创建
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self::with_gate(provider, Arc::new(BaselineGate))
    }

    pub fn with_gate(provider: Arc<dyn ModelProvider>, gate: Arc<dyn StrategyGate>) -> Self {
        Self { provider, gate }
    }

    async fn baseline(&self, image: &RgbImage, question: &str) -> Result<String> {
        let model = self.provider.model().await?;
        model.generate(image, question).await
    }

    async fn memory(&self, image: &RgbImage, question: &str) -> Result<String> {
        debug!("Memory retrieval not wired, answering with baseline generation");
        self.baseline(image, question).await
    }
}

impl Controller for ModelController {
    fn answer<'a>(
        &'a self,
        image: &'a RgbImage,
        question: &'a str,
        source: ControllerSource,
        distilled: DistilledGate,
    ) -> BoxFuture<'a, Result<StrategyResult>> {
        async move {
            if source == ControllerSource::Baseline {
                let answer = self.baseline(image, question).await?;
                return Ok(StrategyResult::new(answer, Strategy::Baseline));
            }

            let strategy = self.gate.select(source, distilled);
            debug!(
                "Gate selected strategy {} ({}) for source={}, distilled={}",
                strategy.action_id(),
                strategy.name(),
                source,
                distilled
            );

            let answer = match strategy {
                Strategy::Memory => self.memory(image, question).await?,
                Strategy::Baseline => self.baseline(image, question).await?,
            };
            Ok(StrategyResult::new(answer, strategy))
        }
        .boxed()
    }

    fn backend(&self) -> &str {
        "vlm"
    }

    fn model_name(&self) -> Option<&str> {
        Some(self.provider.model_name())
    }
}

/// 占位控制器
///
/// 模型依赖不可用时让 UI 仍能启动；所有预测都是假的。
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderController;

impl Controller for PlaceholderController {
    fn answer<'a>(
        &'a self,
        _image: &'a RgbImage,
        _question: &'a str,
        _source: ControllerSource,
        _distilled: DistilledGate,
    ) -> BoxFuture<'a, Result<StrategyResult>> {
        async move { Ok(StrategyResult::new(PLACEHOLDER_ANSWER, Strategy::Baseline)) }.boxed()
    }

    fn backend(&self) -> &str {
        "placeholder"
    }
}

/// 启动时选择控制器实现
pub fn build(config: &AppConfig) -> Arc<dyn Controller> {
    if config.controller.placeholder {
        info!("Placeholder controller requested by configuration");
        return Arc::new(PlaceholderController);
    }

    match LazyModelProvider::vlm(config.vlm.clone()) {
        Ok(provider) => {
            info!(
                "Model controller ready (model '{}' loads on first request)",
                provider.model_name()
            );
            Arc::new(ModelController::new(Arc::new(provider)))
        }
        Err(e) => {
            warn!("Using placeholder controller because model setup failed: {}", e);
            Arc::new(PlaceholderController)
        }
    }
}
