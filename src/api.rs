use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::{
    config::{DecisionThresholds, EnsembleConfig},
    detector::{Media, MediaRef, RawDetection},
    evidence::VerificationReport,
    pipeline::VerificationPipeline,
    provenance::ProvenanceResult,
    signer::{AttestedReport, ReportSigner},
};

// ==========================================
// 1. 应用状态 (Shared State)
// ==========================================
// 所有 HTTP 请求共享。流水线与签名器都是只读的，无需加锁。
pub struct AppState {
    pub pipeline: Arc<VerificationPipeline>,
    pub signer: Arc<ReportSigner>,
    /// `image_path` 的允许范围；`None` 为开发模式
    pub media_root: Option<PathBuf>,
}

// ==========================================
// 2. 数据传输对象 (DTOs)
// ==========================================

/// 请求：完整核验
#[derive(Deserialize)]
pub struct VerifyRequest {
    /// 服务端本地图片路径（受 `AppState::media_root` 约束）
    #[serde(default)]
    pub image_path: Option<String>,
    /// 或者远程图片地址
    #[serde(default)]
    pub image_url: Option<String>,
    /// 可选的配套文本
    #[serde(default)]
    pub text: Option<String>,
}

/// 请求：只做集成判定（检测器由前端自行调用）
#[derive(Deserialize)]
pub struct DecideRequest {
    pub detections: Vec<RawDetection>,
    #[serde(default)]
    pub provenance: Option<ProvenanceResult>,
}

/// 响应：当前生效的权重与阈值
#[derive(Serialize)]
pub struct WeightsResponse {
    pub ensemble: EnsembleConfig,
    pub thresholds: DecisionThresholds,
}

type ApiError = (StatusCode, String);

// ==========================================
// 3. 路由 (Routes)
// ==========================================
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/verify", post(verify))
        .route("/decide", post(decide))
        .route("/weights", get(weights))
        // ⚠️ 开发模式：允许所有跨域；未配置 MEDIA_ROOT 时 image_path 可读取任意本地文件
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ==========================================
// 4. 处理函数 (Handlers)
// ==========================================

/// 接口：完整核验（溯源 → 检测 → 集成 → 判定 → 签名）
async fn verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<AttestedReport>, ApiError> {
    let reference = match (req.image_path, req.image_url) {
        (Some(path), _) => {
            info!(image_path = %path, "📥 收到核验请求（本地图片）");
            let resolved = resolve_local_path(state.media_root.as_deref(), &path).await?;
            let bytes = tokio::fs::read(&resolved)
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("图片读取失败: {path}: {e}")))?;
            MediaRef::Inline {
                bytes,
                mime: guess_mime(&path),
            }
        }
        (None, Some(url)) => {
            info!(image_url = %url, "📥 收到核验请求（远程图片）");
            MediaRef::Url(url)
        }
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "either image_path or image_url is required".to_string(),
            ))
        }
    };

    let media = Media {
        reference,
        text: req.text,
    };
    let report = state.pipeline.verify(media).await;
    attest(&state, report)
}

/// 接口：对客户端提交的检测结果做集成判定
async fn decide(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DecideRequest>,
) -> Result<Json<AttestedReport>, ApiError> {
    info!(detections = req.detections.len(), "📥 收到判定请求");
    let report = state.pipeline.decide_raw(req.detections, req.provenance);
    attest(&state, report)
}

/// 接口：查看权重表
async fn weights(State(state): State<Arc<AppState>>) -> Json<WeightsResponse> {
    Json(WeightsResponse {
        ensemble: state.pipeline.aggregator().config().clone(),
        thresholds: state.pipeline.engine().thresholds().clone(),
    })
}

fn attest(
    state: &AppState,
    report: VerificationReport,
) -> Result<Json<AttestedReport>, ApiError> {
    state.signer.attest(report).map(Json).map_err(|e| {
        error!(error = %e, "❌ 报告签名失败");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

/// 配置了媒体根目录时，规范化后的路径必须落在根目录内（相对路径按根目录解析）
async fn resolve_local_path(root: Option<&Path>, path: &str) -> Result<PathBuf, ApiError> {
    let Some(root) = root else {
        return Ok(PathBuf::from(path));
    };
    let root = tokio::fs::canonicalize(root).await.map_err(|e| {
        error!(root = %root.display(), error = %e, "❌ 媒体根目录不可用");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "media root unavailable".to_string(),
        )
    })?;
    let resolved = tokio::fs::canonicalize(root.join(path))
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("图片读取失败: {path}: {e}")))?;
    if !resolved.starts_with(&root) {
        warn!(image_path = %path, "⛔ 路径越出媒体根目录");
        return Err((
            StatusCode::FORBIDDEN,
            format!("image_path is outside the media root: {path}"),
        ));
    }
    Ok(resolved)
}

fn guess_mime(path: &str) -> Option<String> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => return None,
    };
    Some(mime.to_string())
}
