//! VQA Demo - Visual question answering with a pluggable strategy controller
//!
//! 核心库，提供网页表单、推理入口、策略控制器和 VLM 模型接入。

pub mod ai;
pub mod api;
pub mod config;
pub mod controller;
pub mod inference;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

pub use config::AppConfig;
pub use controller::{Controller, ControllerSource, DistilledGate, StrategyResult};
pub use inference::{predict, ImageInput, PredictRequest, Prediction};

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 策略控制器（真实模型或占位）
    pub controller: Arc<dyn Controller>,
    /// 预测并发许可，超出的请求排队
    pub permits: Arc<Semaphore>,
    /// 启动时间
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 根据配置创建应用状态
    pub fn new(config: AppConfig) -> Self {
        let controller = controller::build(&config);
        Self::with_controller(config, controller)
    }

    /// 使用指定控制器创建应用状态
    pub fn with_controller(config: AppConfig, controller: Arc<dyn Controller>) -> Self {
        let concurrency = config.server.concurrency.max(1);
        info!(
            "App state ready (backend: {}, concurrency: {})",
            controller.backend(),
            concurrency
        );
        Self {
            config: Arc::new(config),
            controller,
            permits: Arc::new(Semaphore::new(concurrency)),
            started_at: Utc::now(),
        }
    }

    /// 在并发限制内执行一次预测
    pub async fn predict(&self, request: PredictRequest) -> Prediction {
        if self.permits.available_permits() == 0 {
            info!("All prediction slots busy, request queued");
        }
        // 信号量不会被关闭；万一关闭也照常执行
        let _permit = self.permits.acquire().await.ok();
        inference::predict(self.controller.as_ref(), request).await
    }
}
