//! 测试用的模型替身

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use image::RgbImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::model::{ModelProvider, VqaModel};

/// 总是返回固定答案，并记录调用次数
pub struct FixedModel {
    answer: String,
    calls: AtomicUsize,
}

impl FixedModel {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VqaModel for FixedModel {
    fn generate<'a>(
        &'a self,
        _image: &'a RgbImage,
        _question: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.trim().to_string();
        async move { Ok(answer) }.boxed()
    }
}

/// 总是失败
pub struct FailingModel(pub &'static str);

impl VqaModel for FailingModel {
    fn generate<'a>(
        &'a self,
        _image: &'a RgbImage,
        _question: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        let message = self.0;
        async move { Err(anyhow::anyhow!(message)) }.boxed()
    }
}

/// 生成时 panic
pub struct PanickingModel;

impl VqaModel for PanickingModel {
    fn generate<'a>(
        &'a self,
        _image: &'a RgbImage,
        _question: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        async move { crash() }.boxed()
    }
}

fn crash() -> Result<String> {
    panic!("generation kernel crashed")
}

/// 进入生成后一直等待，直到测试调用 `release`
pub struct GatedModel {
    answer: String,
    started: AtomicUsize,
    gate: Semaphore,
}

impl GatedModel {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            started: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }

    /// 已进入生成的请求数
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// 放行一个等待中的生成
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

impl VqaModel for GatedModel {
    fn generate<'a>(
        &'a self,
        _image: &'a RgbImage,
        _question: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await?.forget();
            Ok(self.answer.clone())
        }
        .boxed()
    }
}

/// 直接返回给定模型的提供者
pub struct StaticProvider(pub Arc<dyn VqaModel>);

impl StaticProvider {
    pub fn fixed(answer: &str) -> (Arc<FixedModel>, Arc<Self>) {
        let model = Arc::new(FixedModel::new(answer));
        (model.clone(), Arc::new(Self(model)))
    }
}

impl ModelProvider for StaticProvider {
    fn model(&self) -> BoxFuture<'_, Result<Arc<dyn VqaModel>>> {
        let model = Arc::clone(&self.0);
        async move { Ok(model) }.boxed()
    }

    fn model_name(&self) -> &str {
        "static"
    }
}
