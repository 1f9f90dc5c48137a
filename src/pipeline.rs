use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::adapters::{HttpDetector, HttpProvenanceChecker, UnconfiguredDetector};
use crate::config::Config;
use crate::detector::{
    dedupe_sources, Detector, DetectorOutcome, DetectorResult, Media, RawDetection,
};
use crate::ensemble::EnsembleAggregator;
use crate::evidence::{AuditContext, VerificationReport};
use crate::fingerprint::{fingerprint_bytes, MediaFingerprint};
use crate::provenance::{ProvenanceChecker, ProvenanceResult};
use crate::verdict::{DecisionEngine, VerdictDecision};

const DEFAULT_DETECTOR_TIMEOUT: Duration = Duration::from_secs(15);

/// 核验流水线
///
/// 溯源检查 → （溯源未验证时）检测器扇出 → 加权集成 → 判定。
/// 对任意可用/不可用组合都返回一份报告，从不向调用方抛错。
pub struct VerificationPipeline {
    provenance: Option<Arc<dyn ProvenanceChecker>>,
    detectors: Vec<Arc<dyn Detector>>,
    aggregator: EnsembleAggregator,
    engine: DecisionEngine,
    detector_timeout: Duration,
}

impl VerificationPipeline {
    pub fn new(aggregator: EnsembleAggregator, engine: DecisionEngine) -> Self {
        Self {
            provenance: None,
            detectors: Vec::new(),
            aggregator,
            engine,
            detector_timeout: DEFAULT_DETECTOR_TIMEOUT,
        }
    }

    /// 按配置装配 HTTP 适配器；未配置端点的检测器以"未配置"身份参与扇出
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("jianzhen-core/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut pipeline = Self::new(
            EnsembleAggregator::new(config.ensemble.clone()),
            DecisionEngine::new(config.thresholds.clone()),
        )
        .with_timeout(config.detector_timeout);

        if let Some(url) = &config.provenance_url {
            pipeline =
                pipeline.with_provenance(Arc::new(HttpProvenanceChecker::new(url, client.clone())));
        }
        for (kind, url) in &config.detector_urls {
            let detector: Arc<dyn Detector> = match url {
                Some(url) => Arc::new(HttpDetector::new(kind.clone(), url, client.clone())),
                None => Arc::new(UnconfiguredDetector::new(kind.clone())),
            };
            pipeline = pipeline.with_detector(detector);
        }
        Ok(pipeline)
    }

    pub fn with_provenance(mut self, checker: Arc<dyn ProvenanceChecker>) -> Self {
        self.provenance = Some(checker);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.detector_timeout = timeout;
        self
    }

    pub fn aggregator(&self) -> &EnsembleAggregator {
        &self.aggregator
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// 完整核验一份媒体
    ///
    /// 取消语义：丢弃返回的 future 会丢弃内部的 `JoinSet`，所有在途检测任务一并中止；
    /// 不完整的结果集永远不会进入聚合。
    pub async fn verify(&self, media: Media) -> VerificationReport {
        let media = Arc::new(media);
        let mut ctx = AuditContext::begin();
        info!(request_id = %ctx.request_id, detectors = self.detectors.len(), "📥 收到核验请求");

        // 1. 溯源检查与指纹计算并行
        let (provenance, fingerprint) =
            tokio::join!(self.check_provenance(&media), fingerprint(&media));
        let (provenance, provenance_error) = provenance;
        ctx.fingerprint = fingerprint;
        ctx.provenance_error = provenance_error;

        // 2. 溯源已验证：密码学证明优先，跳过全部检测器
        if provenance.as_ref().is_some_and(ProvenanceResult::is_verified) {
            ctx.detection_skipped = true;
            let detection = self
                .aggregator
                .skipped("detection skipped: verified content credentials");
            let decision = self.engine.decide(detection, provenance);
            return self.finish(decision, ctx);
        }

        // 3. 扇出 / 汇合
        let results = self.fan_out(&media).await;
        ctx.detectors_invoked = results.len();

        // 4. 聚合与判定：同步、纯 CPU
        let detection = self.aggregator.aggregate(&results);
        let decision = self.engine.decide(detection, provenance);
        self.finish(decision, ctx)
    }

    /// 只做规整 + 聚合 + 判定（检测器已由客户端自行调用）
    pub fn decide_raw(
        &self,
        detections: Vec<RawDetection>,
        provenance: Option<ProvenanceResult>,
    ) -> VerificationReport {
        let mut ctx = AuditContext::begin();
        ctx.detectors_invoked = detections.len();
        let results = dedupe_sources(
            detections
                .into_iter()
                .map(DetectorResult::normalize)
                .collect(),
        );
        let detection = self.aggregator.aggregate(&results);
        let decision = self
            .engine
            .decide(detection, provenance.map(ProvenanceResult::sanitized));
        self.finish(decision, ctx)
    }

    async fn check_provenance(
        &self,
        media: &Media,
    ) -> (Option<ProvenanceResult>, Option<String>) {
        let Some(checker) = &self.provenance else {
            return (None, None);
        };
        match checker.check(media).await {
            Ok(result) => (Some(result.sanitized()), None),
            Err(e) => {
                warn!(error = %e, "⚠️ 溯源检查失败，按无溯源继续");
                (None, Some(format!("{e:#}")))
            }
        }
    }

    /// 并发调用全部检测器，等待全部结束后按配置顺序返回
    async fn fan_out(&self, media: &Arc<Media>) -> Vec<DetectorResult> {
        let mut join_set = JoinSet::new();
        for (idx, detector) in self.detectors.iter().enumerate() {
            let detector = Arc::clone(detector);
            let media = Arc::clone(media);
            let timeout = self.detector_timeout;
            join_set.spawn(async move {
                let kind = detector.kind();
                let result = match tokio::time::timeout(timeout, detector.detect(&media)).await {
                    Ok(Ok(mut raw)) => {
                        // 结果身份以适配器为准
                        raw.source = kind;
                        DetectorResult::normalize(raw)
                    }
                    Ok(Err(e)) => DetectorResult::unavailable(kind, e.to_string()),
                    Err(_) => DetectorResult::unavailable(
                        kind,
                        format!("timed out after {} ms", timeout.as_millis()),
                    ),
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Option<DetectorResult>> = vec![None; self.detectors.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => warn!(error = %e, "⚠️ 检测任务异常退出"),
            }
        }

        let results = slots
            .into_iter()
            .zip(&self.detectors)
            .map(|(slot, detector)| {
                slot.unwrap_or_else(|| {
                    DetectorResult::unavailable(detector.kind(), "detector task failed")
                })
            })
            .collect();

        dedupe_sources(results)
            .into_iter()
            .inspect(|result| {
                if let DetectorOutcome::Unavailable { error } = &result.outcome {
                    warn!(source = %result.source, error = %error, "检测器不可用");
                }
            })
            .collect()
    }

    fn finish(
        &self,
        decision: VerdictDecision,
        ctx: AuditContext,
    ) -> VerificationReport {
        let report = VerificationReport::assemble(decision, ctx);
        info!(
            request_id = %report.audit_trail.request_id,
            verdict = %report.verdict,
            confidence = report.confidence,
            score = ?report.summary.score,
            variance = ?report.summary.variance,
            "✅ 判定完成"
        );
        report
    }
}

/// 内联媒体的指纹放到阻塞线程池计算；URL 媒体没有指纹
async fn fingerprint(media: &Arc<Media>) -> Option<MediaFingerprint> {
    media.bytes()?;
    let media = Arc::clone(media);
    match tokio::task::spawn_blocking(move || media.bytes().map(fingerprint_bytes)).await {
        Ok(fp) => fp,
        Err(e) => {
            warn!(error = %e, "⚠️ 指纹计算失败");
            None
        }
    }
}
