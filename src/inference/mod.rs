//! 推理入口
//!
//! 校验输入、转换图片、计时，并把控制器的任何失败（包括 panic）
//! 转成给用户看的错误消息。这一层之外不会再有错误向上传播。

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures::FutureExt;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::controller::{Controller, ControllerSource, DistilledGate};

/// 未上传图片时的提示
pub const MISSING_IMAGE: &str = "Please upload an image.";

/// 问题为空时的提示
pub const MISSING_QUESTION: &str = "Please enter a question.";

/// 失败时的策略标签
pub const ERROR_STRATEGY: &str = "error";

/// 请求携带的图片
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// 上传的原始文件（PNG/JPEG/WebP）
    Encoded(Vec<u8>),
    /// base64 文本，可带 `data:image/...;base64,` 前缀
    Base64(String),
    /// 已解码的图片
    Decoded(DynamicImage),
}

impl ImageInput {
    /// 转成 RGB8，去掉 alpha 通道和灰度/调色板模式
    pub fn into_rgb8(self) -> Result<RgbImage> {
        match self {
            Self::Encoded(bytes) => decode(&bytes),
            Self::Base64(text) => {
                let payload = match text.split_once("base64,") {
                    Some((_, data)) => data,
                    None => text.as_str(),
                };
                let bytes = BASE64
                    .decode(payload.trim())
                    .context("invalid base64 image data")?;
                decode(&bytes)
            }
            Self::Decoded(image) => Ok(image.into_rgb8()),
        }
    }
}

fn decode(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(bytes)
        .context("failed to decode image")?
        .into_rgb8())
}

/// 一次预测请求
#[derive(Debug, Clone, Default)]
pub struct PredictRequest {
    pub image: Option<ImageInput>,
    pub question: Option<String>,
    pub source: ControllerSource,
    pub distilled: DistilledGate,
}

/// 预测结果（答案、策略显示、延迟）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub answer: String,
    pub strategy: String,
    pub latency_ms: f64,
}

impl Prediction {
    fn message(text: &str) -> Self {
        Self {
            answer: text.to_string(),
            strategy: String::new(),
            latency_ms: 0.0,
        }
    }

    fn error(message: &str, latency_ms: f64) -> Self {
        Self {
            answer: format!("Error: {}", message),
            strategy: ERROR_STRATEGY.to_string(),
            latency_ms,
        }
    }
}

/// 策略显示格式：`"{action_id} → {strategy_name}"`
pub fn format_strategy(action_id: u32, strategy_name: &str) -> String {
    format!("{} → {}", action_id, strategy_name)
}

/// 毫秒，保留一位小数
fn round_latency(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 10_000.0).round() / 10.0
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 执行一次预测
///
/// 缺少图片或问题时直接返回提示，不调用控制器。
pub async fn predict(controller: &dyn Controller, request: PredictRequest) -> Prediction {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", %request_id, source = %request.source);

    async move {
        let PredictRequest {
            image,
            question,
            source,
            distilled,
        } = request;

        let Some(image) = image else {
            debug!("Rejected request without image");
            return Prediction::message(MISSING_IMAGE);
        };

        let question = question.as_deref().unwrap_or_default().trim();
        if question.is_empty() {
            debug!("Rejected request with empty question");
            return Prediction::message(MISSING_QUESTION);
        }

        let start = Instant::now();
        let outcome = AssertUnwindSafe(async {
            let rgb = image.into_rgb8()?;
            debug!("Image converted to RGB8 ({}x{})", rgb.width(), rgb.height());
            controller.answer(&rgb, question, source, distilled).await
        })
        .catch_unwind()
        .await;
        let latency_ms = round_latency(start.elapsed());

        match outcome {
            Ok(Ok(result)) => {
                info!(
                    "Answered with strategy {} ({}) in {:.1}ms",
                    result.action_id, result.strategy, latency_ms
                );
                Prediction {
                    answer: result.answer,
                    strategy: format_strategy(result.action_id, &result.strategy),
                    latency_ms,
                }
            }
            Ok(Err(err)) => {
                error!("Inference failed:\n{:?}", err);
                Prediction::error(&format!("{:#}", err), latency_ms)
            }
            Err(payload) => {
                let message = format!("inference panicked: {}", panic_message(&*payload));
                error!("{}", message);
                Prediction::error(&message, latency_ms)
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{FailingModel, PanickingModel, StaticProvider};
    use crate::ai::{LazyModelProvider, VqaModel};
    use crate::controller::{ModelController, PlaceholderController};
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Arc;

    fn photo() -> ImageInput {
        ImageInput::Decoded(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            32,
            32,
            image::Rgb([250, 200, 0]),
        )))
    }

    fn request(image: Option<ImageInput>, question: &str, source: &str) -> PredictRequest {
        PredictRequest {
            image,
            question: Some(question.to_string()),
            source: ControllerSource::parse(Some(source)),
            distilled: DistilledGate::Auto,
        }
    }

    fn fixed_controller(answer: &str) -> ModelController {
        let (_, provider) = StaticProvider::fixed(answer);
        ModelController::new(provider)
    }

    #[tokio::test]
    async fn test_missing_image() {
        let controller = fixed_controller("yellow");
        for source in ["auto", "distilled", "ppo", "baseline"] {
            let prediction = predict(&controller, request(None, "anything", source)).await;
            assert_eq!(
                prediction,
                Prediction {
                    answer: MISSING_IMAGE.to_string(),
                    strategy: String::new(),
                    latency_ms: 0.0,
                }
            );
        }
    }

    #[tokio::test]
    async fn test_missing_image_checked_before_question() {
        let controller = fixed_controller("yellow");
        let prediction = predict(&controller, request(None, "   ", "ppo")).await;
        assert_eq!(prediction.answer, MISSING_IMAGE);
    }

    #[tokio::test]
    async fn test_blank_question() {
        let controller = fixed_controller("yellow");
        let prediction = predict(&controller, request(Some(photo()), "   ", "ppo")).await;
        assert_eq!(prediction.answer, MISSING_QUESTION);
        assert_eq!(prediction.strategy, "");
        assert_eq!(prediction.latency_ms, 0.0);

        let absent = PredictRequest {
            image: Some(photo()),
            ..Default::default()
        };
        assert_eq!(predict(&controller, absent).await.answer, MISSING_QUESTION);
    }

    #[tokio::test]
    async fn test_baseline_prediction() {
        let controller = fixed_controller("yellow");
        let prediction = predict(
            &controller,
            request(Some(photo()), "What colour is the bus?", "baseline"),
        )
        .await;

        assert_eq!(prediction.answer, "yellow");
        assert_eq!(prediction.strategy, "0 → baseline");
        assert!(prediction.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_unknown_source_behaves_like_auto() {
        let controller = fixed_controller("yellow");
        let prediction =
            predict(&controller, request(Some(photo()), "colour?", "Mystery")).await;
        assert_eq!(prediction.strategy, "0 → baseline");
    }

    #[tokio::test]
    async fn test_encoded_rgba_upload_is_converted() {
        let mut bytes = Cursor::new(Vec::new());
        RgbaImage::from_pixel(16, 16, Rgba([0, 0, 255, 128]))
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();

        let controller = fixed_controller("blue");
        let prediction = predict(
            &controller,
            request(Some(ImageInput::Encoded(bytes.into_inner())), "colour?", "auto"),
        )
        .await;
        assert_eq!(prediction.answer, "blue");
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_reported() {
        let controller = fixed_controller("blue");
        let prediction = predict(
            &controller,
            request(
                Some(ImageInput::Encoded(b"not an image".to_vec())),
                "colour?",
                "auto",
            ),
        )
        .await;
        assert!(prediction.answer.starts_with("Error: failed to decode image: "));
        assert!(prediction.answer.len() > "Error: failed to decode image: ".len());
        assert_eq!(prediction.strategy, ERROR_STRATEGY);
    }

    #[test]
    fn test_base64_input_accepts_data_url() {
        let mut bytes = Cursor::new(Vec::new());
        RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]))
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        let encoded = BASE64.encode(bytes.into_inner());

        let plain = ImageInput::Base64(encoded.clone()).into_rgb8().unwrap();
        assert_eq!(plain.dimensions(), (3, 2));

        let data_url = ImageInput::Base64(format!("data:image/png;base64,{}", encoded));
        assert_eq!(data_url.into_rgb8().unwrap().get_pixel(0, 0).0, [1, 2, 3]);

        let err = ImageInput::Base64("%%%".to_string()).into_rgb8().unwrap_err();
        assert_eq!(err.to_string(), "invalid base64 image data");
    }

    #[tokio::test]
    async fn test_model_error_is_caught() {
        let controller = ModelController::new(Arc::new(StaticProvider(Arc::new(FailingModel(
            "model endpoint unreachable",
        )))));
        let prediction = predict(&controller, request(Some(photo()), "colour?", "baseline")).await;

        assert_eq!(prediction.answer, "Error: model endpoint unreachable");
        assert_eq!(prediction.strategy, "error");
        assert!(prediction.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_load_failure_shows_cause() {
        let provider = LazyModelProvider::new("qwen", || {
            async {
                Err::<Arc<dyn VqaModel>, _>(anyhow::anyhow!("connection refused (401 unauthorized)"))
            }
            .boxed()
        });
        let controller = ModelController::new(Arc::new(provider));
        let prediction = predict(&controller, request(Some(photo()), "colour?", "auto")).await;

        assert_eq!(
            prediction.answer,
            "Error: failed to load model 'qwen': connection refused (401 unauthorized)"
        );
        assert_eq!(prediction.strategy, ERROR_STRATEGY);
    }

    #[tokio::test]
    async fn test_model_panic_is_caught() {
        let controller = ModelController::new(Arc::new(StaticProvider(Arc::new(PanickingModel))));
        let prediction = predict(&controller, request(Some(photo()), "colour?", "auto")).await;

        assert!(prediction.answer.starts_with("Error: "));
        assert!(prediction.answer.contains("generation kernel crashed"));
        assert_eq!(prediction.strategy, "error");
    }

    #[tokio::test]
    async fn test_placeholder_prediction() {
        let prediction =
            predict(&PlaceholderController, request(Some(photo()), "colour?", "auto")).await;
        assert_eq!(
            prediction.answer,
            "Placeholder answer (wire your models in controller.py)."
        );
        assert_eq!(prediction.strategy, "0 → baseline");
    }

    #[test]
    fn test_format_strategy() {
        assert_eq!(format_strategy(0, "baseline"), "0 → baseline");
        assert_eq!(format_strategy(1, "memory"), "1 → memory");
    }

    #[test]
    fn test_round_latency() {
        assert_eq!(round_latency(Duration::from_micros(12_345)), 12.3);
        assert_eq!(round_latency(Duration::from_micros(12_360)), 12.4);
        assert_eq!(round_latency(Duration::ZERO), 0.0);
    }
}
