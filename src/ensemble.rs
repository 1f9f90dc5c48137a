use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::EnsembleConfig;
use crate::detector::{DetectorKind, DetectorOutcome, DetectorResult};
use crate::variance::standard_deviation;

/// variance 达到此值时集成置信度归零（检测器几乎覆盖 0–100 全区间）
pub const VARIANCE_CONFIDENCE_SPAN: f64 = 50.0;

// ==========================================
// 1. 输出结构 (Ensemble Output)
// ==========================================

/// 单个参与计算的检测器
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorContribution {
    pub source: DetectorKind,
    pub raw_score: f64,
    /// 实际使用的权重（增强后）
    pub applied_weight: f64,
    /// 权重表中的静态权重
    pub default_weight: f64,
    pub confidence: f64,
    pub metadata: Map<String, Value>,
}

/// 未产出分数的检测器
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableDetector {
    pub source: DetectorKind,
    pub error: String,
    pub metadata: Map<String, Value>,
}

/// 审计记录：足以在外部独立复算集成分数
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleAudit {
    pub contributions: Vec<DetectorContribution>,
    pub unavailable: Vec<UnavailableDetector>,
    pub weight_table: BTreeMap<DetectorKind, f64>,
    pub fallback_weight: f64,
    pub primary: DetectorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleResult {
    /// [0,100]；没有任何检测器出分时为 `None`
    pub score: Option<f64>,
    /// 原始分数的总体标准差；与 `score` 同时为 `None`
    pub variance: Option<f64>,
    pub confidence: f64,
    pub available_detector_count: usize,
    pub dominant_source_boosted: bool,
    pub audit: EnsembleAudit,
}

impl EnsembleResult {
    /// (score, variance)，二者总是同时存在或同时缺失
    pub fn signal(&self) -> Option<(f64, f64)> {
        self.score.zip(self.variance)
    }
}

/// confidence = max(0, 1 − variance/50)
pub fn confidence_from_variance(variance: f64) -> f64 {
    (1.0 - variance / VARIANCE_CONFIDENCE_SPAN).max(0.0)
}

// ==========================================
// 2. 加权集成 (Weighted Ensemble)
// ==========================================

/// 加权集成聚合器
///
/// 纯函数式：同一输入永远得到同一输出，不持有跨请求状态。
#[derive(Debug, Clone)]
pub struct EnsembleAggregator {
    config: EnsembleConfig,
}

impl EnsembleAggregator {
    pub fn new(config: EnsembleConfig) -> Self {
        debug_assert!(
            config.validate().is_ok(),
            "invalid ensemble config: {:?}",
            config.validate()
        );
        Self { config }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// 聚合一次运行中所有检测器的结果（含不可用者）
    ///
    /// 永不失败：数据缺失以 `score = None` 表达。
    /// 调用方须保证来源唯一（见 `detector::dedupe_sources`）。
    pub fn aggregate(&self, results: &[DetectorResult]) -> EnsembleResult {
        debug_assert!(
            results
                .iter()
                .enumerate()
                .all(|(i, r)| results[..i].iter().all(|prev| prev.source != r.source)),
            "detector sources must be unique within a run"
        );
        let mut available: Vec<(&DetectorResult, f64, f64)> = Vec::new();
        let mut unavailable = Vec::new();
        for result in results {
            match &result.outcome {
                DetectorOutcome::Scored { score, confidence } => {
                    available.push((result, *score, *confidence));
                }
                DetectorOutcome::Unavailable { error } => unavailable.push(UnavailableDetector {
                    source: result.source.clone(),
                    error: error.clone(),
                    metadata: result.metadata.clone(),
                }),
            }
        }

        if available.is_empty() {
            return self.empty(unavailable, "no detector produced output");
        }

        let boosted = self.has_dominant_signal(&available);
        let policy = &self.config.dominant;

        let contributions: Vec<DetectorContribution> = available
            .iter()
            .map(|(result, score, confidence)| {
                let default_weight = self.config.weight_for(&result.source);
                let applied_weight = match (boosted, result.source == self.config.primary) {
                    (true, true) => policy.boosted_weight,
                    (true, false) => default_weight * policy.other_weight_factor,
                    (false, _) => default_weight,
                };
                debug!(
                    source = %result.source,
                    score,
                    default_weight,
                    applied_weight,
                    "detector contribution"
                );
                DetectorContribution {
                    source: result.source.clone(),
                    raw_score: *score,
                    applied_weight,
                    default_weight,
                    confidence: *confidence,
                    metadata: result.metadata.clone(),
                }
            })
            .collect();

        let raw: Vec<f64> = contributions.iter().map(|c| c.raw_score).collect();
        let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
        let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        // 在实际响应的子集上重新归一化权重，缺席的检测器不把分数拉向 0
        let total_weight: f64 = contributions.iter().map(|c| c.applied_weight).sum();
        let (score, note) = if total_weight > 0.0 {
            let weighted: f64 = contributions
                .iter()
                .map(|c| c.raw_score * c.applied_weight)
                .sum();
            (weighted / total_weight, None)
        } else {
            (
                raw.iter().sum::<f64>() / raw.len() as f64,
                Some("all applied weights were zero; unweighted mean used".to_string()),
            )
        };
        let score = score.clamp(min, max);

        let variance = standard_deviation(&raw);
        debug_assert!(variance >= 0.0);

        EnsembleResult {
            score: Some(score),
            variance: Some(variance),
            confidence: confidence_from_variance(variance),
            available_detector_count: contributions.len(),
            dominant_source_boosted: boosted,
            audit: self.audit(contributions, unavailable, note),
        }
    }

    /// 溯源已验证时跳过检测，生成零检测器的集成结果
    pub fn skipped(&self, reason: &str) -> EnsembleResult {
        self.empty(Vec::new(), reason)
    }

    /// 主检测器是否给出了"高置信 + 极端分数"的强信号
    fn has_dominant_signal(&self, available: &[(&DetectorResult, f64, f64)]) -> bool {
        let policy = &self.config.dominant;
        available
            .iter()
            .find(|(result, _, _)| result.source == self.config.primary)
            .is_some_and(|(_, score, confidence)| {
                *confidence >= policy.min_confidence
                    && (*score >= policy.high_extreme || *score <= policy.low_extreme)
            })
    }

    fn empty(&self, unavailable: Vec<UnavailableDetector>, note: &str) -> EnsembleResult {
        EnsembleResult {
            score: None,
            variance: None,
            confidence: 0.0,
            available_detector_count: 0,
            dominant_source_boosted: false,
            audit: self.audit(Vec::new(), unavailable, Some(note.to_string())),
        }
    }

    fn audit(
        &self,
        contributions: Vec<DetectorContribution>,
        unavailable: Vec<UnavailableDetector>,
        note: Option<String>,
    ) -> EnsembleAudit {
        EnsembleAudit {
            contributions,
            unavailable,
            weight_table: self.config.weights.clone(),
            fallback_weight: self.config.fallback_weight,
            primary: self.config.primary.clone(),
            note,
        }
    }
}

impl Default for EnsembleAggregator {
    fn default() -> Self {
        Self::new(EnsembleConfig::default())
    }
}
