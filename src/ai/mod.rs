//! AI 推理模块
//!
//! 包含图像问答模型接口、延迟加载的模型句柄，以及基于 OpenAI 兼容 API 的 VLM 引擎。

pub mod model;
pub mod vlm;

#[cfg(test)]
pub(crate) mod testing;

pub use model::{LazyModelProvider, ModelProvider, VqaModel};
pub use vlm::{VlmConfig, VlmEngine, VlmError};
