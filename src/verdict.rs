use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DecisionThresholds;
use crate::ensemble::EnsembleResult;
use crate::provenance::ProvenanceResult;

// ==========================================
// 1. 判定与建议 (Verdict & Recommendation)
// ==========================================

/// 五种判定，封闭且有序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    VerifiedAuthentic,
    LikelyAuthentic,
    Uncertain,
    LikelySynthetic,
    Inconclusive,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::VerifiedAuthentic => "VERIFIED_AUTHENTIC",
            Verdict::LikelyAuthentic => "LIKELY_AUTHENTIC",
            Verdict::Uncertain => "UNCERTAIN",
            Verdict::LikelySynthetic => "LIKELY_SYNTHETIC",
            Verdict::Inconclusive => "INCONCLUSIVE",
        }
    }

    pub fn recommendation(&self) -> Recommendation {
        match self {
            Verdict::VerifiedAuthentic => Recommendation::Trust,
            Verdict::LikelyAuthentic => Recommendation::LikelySafe,
            Verdict::Uncertain => Recommendation::Review,
            Verdict::LikelySynthetic => Recommendation::Caution,
            Verdict::Inconclusive => Recommendation::ManualReview,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "TRUST")]
    Trust,
    #[serde(rename = "LIKELY SAFE")]
    LikelySafe,
    #[serde(rename = "REVIEW")]
    Review,
    #[serde(rename = "CAUTION")]
    Caution,
    #[serde(rename = "MANUAL REVIEW")]
    ManualReview,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Trust => "TRUST",
            Recommendation::LikelySafe => "LIKELY SAFE",
            Recommendation::Review => "REVIEW",
            Recommendation::Caution => "CAUTION",
            Recommendation::ManualReview => "MANUAL REVIEW",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 2. 判定格 (Decision Lattice)
// ==========================================

/// 命中的规则，按求值顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    ProvenanceOverride,
    NoSignal,
    HighDisagreement,
    LowScoreLowDisagreement,
    HighScoreLowDisagreement,
    AmbiguousSignal,
}

impl DecisionRule {
    /// 作用于 (score, variance) 的四条规则
    pub const LATTICE: [DecisionRule; 4] = [
        DecisionRule::HighDisagreement,
        DecisionRule::LowScoreLowDisagreement,
        DecisionRule::HighScoreLowDisagreement,
        DecisionRule::AmbiguousSignal,
    ];

    pub fn verdict(self) -> Verdict {
        match self {
            DecisionRule::ProvenanceOverride => Verdict::VerifiedAuthentic,
            DecisionRule::NoSignal | DecisionRule::HighDisagreement => Verdict::Inconclusive,
            DecisionRule::LowScoreLowDisagreement => Verdict::LikelyAuthentic,
            DecisionRule::HighScoreLowDisagreement => Verdict::LikelySynthetic,
            DecisionRule::AmbiguousSignal => Verdict::Uncertain,
        }
    }

    /// 该规则的完整谓词（独立于求值顺序）
    ///
    /// 每条谓词都显式写出自己的区域，互斥性由测试在网格上验证。
    pub fn matches(self, score: f64, variance: f64, t: &DecisionThresholds) -> bool {
        let agreed = variance < t.low_disagreement;
        match self {
            DecisionRule::HighDisagreement => variance > t.high_disagreement,
            DecisionRule::LowScoreLowDisagreement => agreed && score < t.authentic_below,
            DecisionRule::HighScoreLowDisagreement => agreed && score > t.synthetic_above,
            DecisionRule::AmbiguousSignal => {
                let moderate = variance >= t.low_disagreement && variance <= t.high_disagreement;
                let mid = score >= t.authentic_below && score <= t.synthetic_above;
                moderate || (agreed && mid)
            }
            DecisionRule::ProvenanceOverride | DecisionRule::NoSignal => false,
        }
    }

    /// 按顺序取第一条命中的规则
    pub fn classify(score: f64, variance: f64, t: &DecisionThresholds) -> DecisionRule {
        DecisionRule::LATTICE
            .into_iter()
            .find(|rule| rule.matches(score, variance, t))
            .unwrap_or(DecisionRule::AmbiguousSignal)
    }
}

/// 阈值比较方向（均为严格比较）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl Comparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Lt => value < threshold,
        }
    }
}

/// 一次阈值比较
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdCheck {
    pub metric: &'static str,
    pub comparison: Comparison,
    pub value: f64,
    pub threshold: f64,
    pub passed: bool,
}

impl ThresholdCheck {
    fn new(metric: &'static str, comparison: Comparison, value: f64, threshold: f64) -> Self {
        Self {
            metric,
            comparison,
            value,
            threshold,
            passed: comparison.holds(value, threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionAudit {
    pub rule: DecisionRule,
    pub checks: Vec<ThresholdCheck>,
    pub thresholds: DecisionThresholds,
}

/// 产生判定的全部输入，原样保留
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionFactors {
    pub provenance: Option<ProvenanceResult>,
    pub detection: EnsembleResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictDecision {
    pub verdict: Verdict,
    pub confidence: f64,
    pub explanation: String,
    pub recommendation: Recommendation,
    pub factors: DecisionFactors,
    pub audit: DecisionAudit,
}

// ==========================================
// 3. 判定引擎 (Decision Engine)
// ==========================================

/// 无状态单步分类器：同一输入永远得到同一判定
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    thresholds: DecisionThresholds,
}

impl DecisionEngine {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    pub fn decide(
        &self,
        detection: EnsembleResult,
        provenance: Option<ProvenanceResult>,
    ) -> VerdictDecision {
        let t = &self.thresholds;

        // 规则 1：溯源优先。检测结果保留在 factors 里，但不参与判定
        if let Some(p) = provenance.as_ref().filter(|p| p.is_verified()) {
            let explanation = provenance_explanation(p);
            return self.finish(
                DecisionRule::ProvenanceOverride,
                1.0,
                explanation,
                Vec::new(),
                detection,
                provenance,
            );
        }

        let invalid_credentials = provenance
            .as_ref()
            .is_some_and(|p| p.has_credentials && !p.is_valid);

        // 规则 2：无信号
        let Some((score, variance)) = detection.signal() else {
            let mut explanation = String::from(
                "Automated analysis was unavailable: no detector returned a result and no \
                 valid content credentials were found, so authenticity could not be assessed.",
            );
            if invalid_credentials {
                explanation.push_str(" Content credentials were present but failed validation.");
            }
            return self.finish(
                DecisionRule::NoSignal,
                0.0,
                explanation,
                Vec::new(),
                detection,
                provenance,
            );
        };

        let rule = DecisionRule::classify(score, variance, t);
        let checks = lattice_checks(rule, score, variance, t);

        let mut explanation = match rule {
            DecisionRule::HighDisagreement => format!(
                "Detectors disagree strongly (variance {variance:.1} > {:.1}) around an ensemble \
                 score of {score:.1}%. Disagreement outweighs any single signal, so no reliable \
                 conclusion can be drawn.",
                t.high_disagreement
            ),
            DecisionRule::LowScoreLowDisagreement => format!(
                "Detectors agree (variance {variance:.1}) on a low synthetic probability of \
                 {score:.1}%. No verified content credentials were found, so this is a \
                 probabilistic assessment."
            ),
            DecisionRule::HighScoreLowDisagreement => format!(
                "Detectors agree (variance {variance:.1}) on a high synthetic probability of \
                 {score:.1}%. The media shows strong signs of AI generation or manipulation."
            ),
            _ => format!(
                "Ensemble score {score:.1}% with variance {variance:.1} falls in the ambiguous \
                 range; the evidence does not clearly favour either origin."
            ),
        };
        if detection.dominant_source_boosted {
            explanation.push_str(&format!(
                " A high-confidence signal from {} was weighted more heavily.",
                detection.audit.primary
            ));
        }
        if invalid_credentials {
            explanation.push_str(" Content credentials were present but failed validation.");
        }

        let confidence = detection.confidence;
        self.finish(rule, confidence, explanation, checks, detection, provenance)
    }

    fn finish(
        &self,
        rule: DecisionRule,
        confidence: f64,
        explanation: String,
        checks: Vec<ThresholdCheck>,
        detection: EnsembleResult,
        provenance: Option<ProvenanceResult>,
    ) -> VerdictDecision {
        let verdict = rule.verdict();
        VerdictDecision {
            verdict,
            confidence,
            explanation,
            recommendation: verdict.recommendation(),
            factors: DecisionFactors {
                provenance,
                detection,
            },
            audit: DecisionAudit {
                rule,
                checks,
                thresholds: self.thresholds.clone(),
            },
        }
    }
}

fn provenance_explanation(p: &ProvenanceResult) -> String {
    let issuer = p.issuer.as_deref().unwrap_or("an unnamed issuer");
    let signed = p
        .signed_at
        .as_deref()
        .map(|at| format!(" (signed {at})"))
        .unwrap_or_default();
    format!(
        "Valid content credentials from {issuer}{signed} cryptographically confirm this media's \
         origin. Detector output is retained for transparency but was not used."
    )
}

/// 依求值顺序记录比较过的阈值，直到命中规则为止
fn lattice_checks(
    rule: DecisionRule,
    score: f64,
    variance: f64,
    t: &DecisionThresholds,
) -> Vec<ThresholdCheck> {
    let mut checks = vec![ThresholdCheck::new(
        "variance",
        Comparison::Gt,
        variance,
        t.high_disagreement,
    )];
    if rule == DecisionRule::HighDisagreement {
        return checks;
    }
    checks.push(ThresholdCheck::new("score", Comparison::Lt, score, t.authentic_below));
    checks.push(ThresholdCheck::new(
        "variance",
        Comparison::Lt,
        variance,
        t.low_disagreement,
    ));
    if rule == DecisionRule::LowScoreLowDisagreement {
        return checks;
    }
    checks.push(ThresholdCheck::new("score", Comparison::Gt, score, t.synthetic_above));
    checks.push(ThresholdCheck::new(
        "variance",
        Comparison::Lt,
        variance,
        t.low_disagreement,
    ));
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectorKind, DetectorResult};
    use crate::ensemble::EnsembleAggregator;

    fn ensemble(results: &[DetectorResult]) -> EnsembleResult {
        EnsembleAggregator::default().aggregate(results)
    }

    #[test]
    fn every_lattice_point_matches_exactly_one_rule() {
        let t = DecisionThresholds::default();
        // 0.25 步长覆盖所有边界值 (15, 25, 30, 70)
        for si in 0..=400 {
            let score = si as f64 * 0.25;
            for vi in 0..=240 {
                let variance = vi as f64 * 0.25;
                let matched: Vec<DecisionRule> = DecisionRule::LATTICE
                    .into_iter()
                    .filter(|r| r.matches(score, variance, &t))
                    .collect();
                assert_eq!(
                    matched.len(),
                    1,
                    "score={score} variance={variance} matched {matched:?}"
                );
                if variance > 25.0 {
                    assert_eq!(matched[0], DecisionRule::HighDisagreement);
                }
                assert_eq!(DecisionRule::classify(score, variance, &t), matched[0]);
            }
        }
    }

    #[test]
    fn lattice_boundaries() {
        let t = DecisionThresholds::default();
        let c = |s, v| DecisionRule::classify(s, v, &t).verdict();
        assert_eq!(c(10.0, 25.0), Verdict::Uncertain);
        assert_eq!(c(10.0, 25.01), Verdict::Inconclusive);
        assert_eq!(c(29.9, 14.9), Verdict::LikelyAuthentic);
        assert_eq!(c(30.0, 0.0), Verdict::Uncertain);
        assert_eq!(c(10.0, 15.0), Verdict::Uncertain);
        assert_eq!(c(70.1, 0.0), Verdict::LikelySynthetic);
        assert_eq!(c(70.0, 0.0), Verdict::Uncertain);
    }

    #[test]
    fn verified_provenance_overrides_detectors() {
        let detection = ensemble(&[
            DetectorResult::scored(DetectorKind::VisionModel, 99.0, 0.99),
            DetectorResult::scored(DetectorKind::ArtifactForensics, 97.0, 0.9),
        ]);
        let d = DecisionEngine::default().decide(
            detection.clone(),
            Some(ProvenanceResult::verified("Leica Camera AG", None)),
        );
        assert_eq!(d.verdict, Verdict::VerifiedAuthentic);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.recommendation, Recommendation::Trust);
        assert_eq!(d.audit.rule, DecisionRule::ProvenanceOverride);
        assert!(d.explanation.contains("Leica Camera AG"));
        // 检测输入仍完整保留
        assert_eq!(d.factors.detection, detection);
    }

    #[test]
    fn invalid_credentials_do_not_override() {
        let d = DecisionEngine::default().decide(
            ensemble(&[DetectorResult::scored(DetectorKind::VisionModel, 90.0, 0.9)]),
            Some(ProvenanceResult::invalid(Some("Unknown CA".into()))),
        );
        assert_eq!(d.verdict, Verdict::LikelySynthetic);
        assert!(d.explanation.contains("failed validation"));
    }

    #[test]
    fn no_signal_is_inconclusive_with_zero_confidence() {
        let d = DecisionEngine::default().decide(ensemble(&[]), None);
        assert_eq!(d.verdict, Verdict::Inconclusive);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.recommendation, Recommendation::ManualReview);
        assert_eq!(d.audit.rule, DecisionRule::NoSignal);
        assert!(d.explanation.contains("unavailable"));
    }

    #[test]
    fn high_disagreement_keeps_ensemble_confidence() {
        let detection = ensemble(&[
            DetectorResult::scored(DetectorKind::ArtifactForensics, 90.0, 0.6),
            DetectorResult::scored(DetectorKind::FrequencyAnalysis, 10.0, 0.6),
        ]);
        let confidence = detection.confidence;
        let d = DecisionEngine::default().decide(detection, None);
        assert_eq!(d.verdict, Verdict::Inconclusive);
        assert_eq!(d.audit.rule, DecisionRule::HighDisagreement);
        assert_eq!(d.confidence, confidence);
        assert!(d.explanation.contains("variance 40.0"));
        assert_eq!(d.audit.checks.len(), 1);
        assert!(d.audit.checks[0].passed);
    }

    #[test]
    fn threshold_checks_record_strict_comparisons() {
        let d = DecisionEngine::default().decide(
            ensemble(&[
                DetectorResult::scored(DetectorKind::ArtifactForensics, 10.0, 0.6),
                DetectorResult::scored(DetectorKind::FrequencyAnalysis, 12.0, 0.6),
            ]),
            None,
        );
        assert_eq!(d.audit.rule, DecisionRule::LowScoreLowDisagreement);
        let comparisons: Vec<Comparison> = d.audit.checks.iter().map(|c| c.comparison).collect();
        assert_eq!(
            comparisons,
            vec![Comparison::Gt, Comparison::Lt, Comparison::Lt]
        );
        assert_eq!(
            d.audit.checks.iter().map(|c| c.passed).collect::<Vec<_>>(),
            vec![false, true, true]
        );
        assert!(!Comparison::Lt.holds(30.0, 30.0));

        let json = serde_json::to_value(&d.audit.checks[0]).unwrap();
        assert_eq!(json["comparison"], ">");
        assert_eq!(json["metric"], "variance");
    }

    #[test]
    fn explanation_embeds_one_decimal_figures() {
        let d = DecisionEngine::default().decide(
            ensemble(&[
                DetectorResult::scored(DetectorKind::ArtifactForensics, 50.0, 0.5),
                DetectorResult::scored(DetectorKind::FrequencyAnalysis, 52.0, 0.5),
            ]),
            None,
        );
        assert_eq!(d.verdict, Verdict::Uncertain);
        assert_eq!(d.recommendation.as_str(), "REVIEW");
        assert!(d.explanation.contains("variance 1.0"), "{}", d.explanation);
    }

    #[test]
    fn serializes_presentation_tags() {
        assert_eq!(
            serde_json::to_value(Verdict::LikelySynthetic).unwrap(),
            "LIKELY_SYNTHETIC"
        );
        assert_eq!(
            serde_json::to_value(Recommendation::ManualReview).unwrap(),
            "MANUAL REVIEW"
        );
    }
}
