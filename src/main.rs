//! VQA Demo 主入口

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vqa_demo::{
    api, AppConfig, AppState, ControllerSource, DistilledGate, ImageInput, PredictRequest,
};

#[derive(Debug, Parser)]
#[command(name = "vqa-demo", version, about = "Visual question answering demo server")]
struct Cli {
    /// 配置文件路径（默认使用系统配置目录）
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// 覆盖监听端口
    #[arg(long, global = true)]
    port: Option<u16>,
    /// 使用占位控制器，不加载模型
    #[arg(long, global = true)]
    placeholder: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 启动网页服务（默认）
    Serve,
    /// 对单张图片提问并打印结果
    Predict(PredictArgs),
    /// 写出默认配置文件
    InitConfig,
}

#[derive(Debug, Parser)]
struct PredictArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    question: String,
    #[arg(long, default_value = "auto")]
    source: String,
    #[arg(long, default_value = "auto")]
    distilled_model: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vqa_demo=debug".parse()?))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Some(Command::InitConfig) => init_config(cli.config.as_deref()),
        Some(Command::Predict(args)) => {
            let state = AppState::new(load_config(&cli)?);
            predict_once(&state, args).await
        }
        Some(Command::Serve) | None => serve(load_config(&cli)?).await,
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.placeholder {
        config.controller.placeholder = true;
    }
    Ok(config)
}

fn init_config(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_path()?,
    };
    AppConfig::default().save_to(&path)?;
    println!("{}", path.display());
    Ok(())
}

async fn predict_once(state: &AppState, args: &PredictArgs) -> Result<()> {
    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read image {}", args.image.display()))?;

    let prediction = state
        .predict(PredictRequest {
            image: Some(ImageInput::Encoded(bytes)),
            question: Some(args.question.clone()),
            source: ControllerSource::parse(Some(args.source.as_str())),
            distilled: DistilledGate::parse(Some(args.distilled_model.as_str())),
        })
        .await;

    println!("Answer: {}", prediction.answer);
    println!("Chosen Strategy: {}", prediction.strategy);
    println!("Latency (ms): {:.1}", prediction.latency_ms);
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Starting VQA Demo v{}", env!("CARGO_PKG_VERSION"));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    Ok(())
}
