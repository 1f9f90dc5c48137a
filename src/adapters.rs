//! 通用 HTTP 适配器
//!
//! 检测服务与溯源服务都按同一约定调用：内联媒体以原始字节 POST，
//! 远程媒体以 `{"url": ...}` JSON POST；响应为 JSON。
//! 不绑定任何具体厂商的 API。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::detector::{Detector, DetectorKind, Media, MediaRef, RawDetection};
use crate::error::AdapterError;
use crate::provenance::{ProvenanceChecker, ProvenanceResult};

/// 检测服务响应体
#[derive(Debug, Default, Deserialize)]
struct ProviderPayload {
    #[serde(default)]
    score: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpDetector {
    kind: DetectorKind,
    endpoint: String,
    client: Client,
}

impl HttpDetector {
    pub fn new(kind: DetectorKind, endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    fn kind(&self) -> DetectorKind {
        self.kind.clone()
    }

    async fn detect(&self, media: &Media) -> Result<RawDetection, AdapterError> {
        let request = if self.kind == DetectorKind::TextClassifier {
            // 文本检测器只看附带文本
            let text = media
                .text
                .as_deref()
                .ok_or_else(|| AdapterError::Unsupported("no text attached".to_string()))?;
            self.client.post(&self.endpoint).json(&json!({ "text": text }))
        } else {
            post_media(&self.client, &self.endpoint, media)
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let payload: ProviderPayload = response.json().await?;

        Ok(RawDetection {
            source: self.kind.clone(),
            score: payload.score,
            confidence: payload.confidence,
            metadata: payload.metadata,
            error: payload.error,
        })
    }
}

/// 未配置端点的检测器：照常参与扇出，永远报告不可用
pub struct UnconfiguredDetector {
    kind: DetectorKind,
}

impl UnconfiguredDetector {
    pub fn new(kind: DetectorKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Detector for UnconfiguredDetector {
    fn kind(&self) -> DetectorKind {
        self.kind.clone()
    }

    async fn detect(&self, _media: &Media) -> Result<RawDetection, AdapterError> {
        Err(AdapterError::NotConfigured(self.kind.to_string()))
    }
}

/// 溯源清单解析服务
pub struct HttpProvenanceChecker {
    endpoint: String,
    client: Client,
}

impl HttpProvenanceChecker {
    pub fn new(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl ProvenanceChecker for HttpProvenanceChecker {
    async fn check(&self, media: &Media) -> anyhow::Result<ProvenanceResult> {
        let response = post_media(&self.client, &self.endpoint, media)
            .send()
            .await?
            .error_for_status()?;
        let result: ProvenanceResult = response.json().await?;
        Ok(result.sanitized())
    }
}

fn post_media(client: &Client, endpoint: &str, media: &Media) -> reqwest::RequestBuilder {
    match &media.reference {
        MediaRef::Url(url) => client.post(endpoint).json(&json!({ "url": url })),
        MediaRef::Inline { bytes, mime } => client
            .post(endpoint)
            .header(
                reqwest::header::CONTENT_TYPE,
                mime.as_deref().unwrap_or("application/octet-stream"),
            )
            .body(bytes.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{http::StatusCode, routing::post, Json, Router};
    use tokio::net::TcpListener;

    use crate::detector::DetectorResult;
    use crate::ensemble::EnsembleAggregator;
    use crate::pipeline::VerificationPipeline;
    use crate::verdict::DecisionEngine;

    /// 本地起一个假的检测 / 溯源服务，返回其基地址
    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn provider() -> Router {
        Router::new()
            .route(
                "/score",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "score": 81.5,
                        "confidence": 0.9,
                        "metadata": { "url": body["url"] }
                    }))
                }),
            )
            .route(
                "/text",
                post(|Json(body): Json<Value>| async move {
                    let chars = body["text"].as_str().map(str::len).unwrap_or_default();
                    Json(json!({ "score": 64, "confidence": 0.8, "metadata": { "chars": chars } }))
                }),
            )
            .route(
                "/overloaded",
                post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
            )
            .route("/garbage", post(|| async { "<html>oops</html>" }))
            .route(
                "/manifest",
                post(|| async {
                    Json(json!({ "hasCredentials": true, "isValid": true, "issuer": "Canon" }))
                }),
            )
            .route(
                "/manifest-down",
                post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
    }

    fn detector(kind: DetectorKind, base: &str, path: &str) -> HttpDetector {
        HttpDetector::new(kind, format!("{base}{path}"), Client::new())
    }

    #[tokio::test]
    async fn unconfigured_detector_reports_not_configured() {
        let d = UnconfiguredDetector::new(DetectorKind::FrequencyAnalysis);
        let err = d.detect(&Media::url("https://example.org/a.png")).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotConfigured(ref k) if k == "frequency_analysis"));
    }

    #[tokio::test]
    async fn text_detector_without_text_is_unsupported() {
        let d = HttpDetector::new(
            DetectorKind::TextClassifier,
            "http://127.0.0.1:9/never-called",
            Client::new(),
        );
        let err = d.detect(&Media::inline(vec![1, 2, 3])).await.unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported(_)));
    }

    #[test]
    fn provider_payload_tolerates_missing_fields() {
        let p: ProviderPayload = serde_json::from_str(r#"{"score": 71.2}"#).unwrap();
        assert_eq!(p.score, Some(json!(71.2)));
        assert!(p.confidence.is_none());
        assert!(p.metadata.is_empty());
    }

    #[tokio::test]
    async fn success_payload_becomes_raw_detection() {
        let base = serve(provider()).await;
        let raw = detector(DetectorKind::VisionModel, &base, "/score")
            .detect(&Media::url("https://example.org/a.png"))
            .await
            .unwrap();

        assert_eq!(raw.source, DetectorKind::VisionModel);
        assert_eq!(raw.metadata["url"], "https://example.org/a.png");
        let result = DetectorResult::normalize(raw);
        assert_eq!(result.score(), Some(81.5));
    }

    #[tokio::test]
    async fn non_success_status_is_status_error() {
        let base = serve(provider()).await;
        let err = detector(DetectorKind::VisionModel, &base, "/overloaded")
            .detect(&Media::inline(vec![0xFF, 0xD8]))
            .await
            .unwrap_err();
        match err {
            AdapterError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_payload_error() {
        let base = serve(provider()).await;
        let err = detector(DetectorKind::FrequencyAnalysis, &base, "/garbage")
            .detect(&Media::url("https://example.org/a.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Payload(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = detector(DetectorKind::VisionModel, &format!("http://{addr}"), "/score")
            .detect(&Media::url("https://example.org/a.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn attached_text_is_posted_as_json() {
        let base = serve(provider()).await;
        let media = Media::inline(vec![1, 2, 3]).with_text("a caption of twenty-two");
        let raw = detector(DetectorKind::TextClassifier, &base, "/text")
            .detect(&media)
            .await
            .unwrap();

        assert_eq!(raw.score, Some(json!(64)));
        assert_eq!(raw.metadata["chars"], 23);
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_unavailable_in_pipeline() {
        let base = serve(provider()).await;
        let pipeline =
            VerificationPipeline::new(EnsembleAggregator::default(), DecisionEngine::default())
                .with_detector(Arc::new(detector(DetectorKind::VisionModel, &base, "/overloaded")))
                .with_detector(Arc::new(detector(
                    DetectorKind::ArtifactForensics,
                    &base,
                    "/garbage",
                )))
                .with_detector(Arc::new(detector(
                    DetectorKind::FrequencyAnalysis,
                    &base,
                    "/score",
                )));

        let report = pipeline.verify(Media::url("https://example.org/a.png")).await;

        assert_eq!(report.summary.detectors_used, 1);
        assert_eq!(report.summary.score, Some(81.5));
        let unavailable = &report.factors.detection.audit.unavailable;
        assert_eq!(unavailable.len(), 2);
        assert_eq!(unavailable[0].source, DetectorKind::VisionModel);
        assert!(unavailable[0].error.contains("HTTP 503"));
        assert_eq!(unavailable[1].source, DetectorKind::ArtifactForensics);
        assert!(unavailable[1].error.starts_with("malformed provider payload"));
    }

    #[tokio::test]
    async fn provenance_checker_reads_manifest_response() {
        let base = serve(provider()).await;
        let media = Media::url("https://example.org/a.png");

        let ok = HttpProvenanceChecker::new(format!("{base}/manifest"), Client::new())
            .check(&media)
            .await
            .unwrap();
        assert!(ok.is_verified());
        assert_eq!(ok.issuer.as_deref(), Some("Canon"));

        let down = HttpProvenanceChecker::new(format!("{base}/manifest-down"), Client::new())
            .check(&media)
            .await;
        assert!(down.is_err());
    }
}
