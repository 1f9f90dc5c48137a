use std::sync::Arc;

use jianzhen_core::{api, signer::ReportSigner, Config, VerificationPipeline};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ----------------------------------------------------------------
    // 0. 加载配置
    // ----------------------------------------------------------------
    let config = Config::from_env()?;
    info!(
        host = %config.host,
        port = config.port,
        key = %config.key_path,
        timeout_ms = config.detector_timeout.as_millis() as u64,
        "⚙️  配置加载完成"
    );

    // ----------------------------------------------------------------
    // 1. 身份加载 & 流水线装配
    // ----------------------------------------------------------------
    info!("🛡️ [鉴真 Jianzhen] 媒体真伪核验服务启动中...");

    let signer = ReportSigner::load_or_generate(&config.key_path)?;
    info!(public_key = %hex::encode(signer.public_key().to_bytes()), "🆔 服务身份");

    let pipeline = VerificationPipeline::from_config(&config)?;
    for (kind, url) in &config.detector_urls {
        match url {
            Some(url) => info!(detector = %kind, endpoint = %url, "🔌 检测器已配置"),
            None => info!(detector = %kind, "🔌 检测器未配置（将报告不可用）"),
        }
    }
    if config.provenance_url.is_none() {
        info!("🔏 未配置溯源服务，所有请求按无溯源处理");
    }
    match &config.media_root {
        Some(root) => info!(media_root = %root.display(), "📂 image_path 限定在媒体根目录内"),
        None => warn!("⚠️ 未配置 MEDIA_ROOT：image_path 可读取任意本地文件（仅限开发模式）"),
    }

    // ----------------------------------------------------------------
    // 2. 状态共享容器
    // ----------------------------------------------------------------
    let shared_state = Arc::new(api::AppState {
        pipeline: Arc::new(pipeline),
        signer: Arc::new(signer),
        media_root: config.media_root.clone(),
    });

    // ----------------------------------------------------------------
    // 3. 启动 HTTP 服务
    // ----------------------------------------------------------------
    let app = api::app(shared_state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("🚀 API 服务已运行在: http://{}", addr);
    info!("   - POST /verify  : 提交图片进行完整核验");
    info!("   - POST /decide  : 对已有检测结果做集成判定");
    info!("   - GET  /weights : 查看权重表与判定阈值");

    axum::serve(listener, app).await?;

    Ok(())
}
