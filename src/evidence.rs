use chrono::{DateTime, Utc};
use serde::Serialize; // 序列化为 JSON 交给展示层 / 签名器
use uuid::Uuid;

use crate::fingerprint::MediaFingerprint;
use crate::verdict::{DecisionAudit, DecisionFactors, Recommendation, Verdict, VerdictDecision};

/// 核验报告（证据包）
///
/// 展示层消费的最终对象。判定所依据的全部输入都保留在 `factors` 里，
/// 任何一次判定都可以据此独立复核。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    // === 第一层：结论 (Conclusion) ===
    pub verdict: Verdict,
    pub confidence: f64,
    pub explanation: String,
    pub recommendation: Recommendation,

    // === 第二层：依据 (Factors) ===
    // provenance + detection，原样保留
    pub factors: DecisionFactors,

    // === 第三层：审计 (Audit) ===
    pub audit_trail: AuditTrail,

    // === 第四层：摘要 (Summary) ===
    // 扁平化投影，字段即使为 null 也必须存在
    pub summary: Summary,
}

/// 审计链
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// 仅内联媒体有指纹
    pub fingerprint: Option<MediaFingerprint>,
    /// 溯源协作方的灾难性失败（按"无溯源"继续）
    pub provenance_error: Option<String>,
    pub detectors_invoked: usize,
    /// 溯源已验证，检测被短路跳过
    pub detection_skipped: bool,
    pub decision: DecisionAudit,
}

/// 展示用摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub verdict: Verdict,
    pub score: Option<f64>,
    pub variance: Option<f64>,
    pub confidence: f64,
    pub has_provenance: bool,
    pub detectors_used: usize,
}

/// 组装报告时的审计上下文
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub fingerprint: Option<MediaFingerprint>,
    pub provenance_error: Option<String>,
    pub detectors_invoked: usize,
    pub detection_skipped: bool,
}

impl AuditContext {
    pub fn begin() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            started_at: Utc::now(),
            fingerprint: None,
            provenance_error: None,
            detectors_invoked: 0,
            detection_skipped: false,
        }
    }
}

impl VerificationReport {
    pub fn assemble(decision: VerdictDecision, ctx: AuditContext) -> Self {
        let VerdictDecision {
            verdict,
            confidence,
            explanation,
            recommendation,
            factors,
            audit,
        } = decision;

        let summary = Summary {
            verdict,
            score: factors.detection.score,
            variance: factors.detection.variance,
            confidence,
            has_provenance: factors
                .provenance
                .as_ref()
                .is_some_and(|p| p.has_credentials),
            detectors_used: factors.detection.available_detector_count,
        };

        Self {
            verdict,
            confidence,
            explanation,
            recommendation,
            factors,
            audit_trail: AuditTrail {
                request_id: ctx.request_id,
                started_at: ctx.started_at,
                completed_at: Utc::now(),
                fingerprint: ctx.fingerprint,
                provenance_error: ctx.provenance_error,
                detectors_invoked: ctx.detectors_invoked,
                detection_skipped: ctx.detection_skipped,
                decision: audit,
            },
            summary,
        }
    }
}
