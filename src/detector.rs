use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AdapterError;

// ==========================================
// 1. 检测器身份 (Detector Identity)
// ==========================================

/// 检测器种类
///
/// 封闭枚举：权重查找与"主信号"判断都按变体穷举，
/// 不认识的标识统一落到 `Other`，使用兜底权重。
/// 序列化为 snake_case 字符串，例如 `"vision_model"`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DetectorKind {
    /// 大型视觉分类模型（最强的单一信号）
    VisionModel,
    /// 生成伪影取证（边缘、插值痕迹）
    ArtifactForensics,
    /// 频域分析（GAN/扩散模型的频谱指纹）
    FrequencyAnalysis,
    /// 配套文本的 AI 生成检测
    TextClassifier,
    /// 未登记的来源
    Other(String),
}

impl DetectorKind {
    /// 所有已登记的种类，顺序即默认的扇出顺序
    pub const KNOWN: [DetectorKind; 4] = [
        DetectorKind::VisionModel,
        DetectorKind::ArtifactForensics,
        DetectorKind::FrequencyAnalysis,
        DetectorKind::TextClassifier,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            DetectorKind::VisionModel => "vision_model",
            DetectorKind::ArtifactForensics => "artifact_forensics",
            DetectorKind::FrequencyAnalysis => "frequency_analysis",
            DetectorKind::TextClassifier => "text_classifier",
            DetectorKind::Other(name) => name,
        }
    }

    /// 环境变量片段，例如 `VISION_MODEL`
    pub fn env_key(&self) -> String {
        self.as_str().to_ascii_uppercase().replace(['-', '.', ' '], "_")
    }
}

impl From<String> for DetectorKind {
    fn from(value: String) -> Self {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "vision_model" => DetectorKind::VisionModel,
            "artifact_forensics" => DetectorKind::ArtifactForensics,
            "frequency_analysis" => DetectorKind::FrequencyAnalysis,
            "text_classifier" => DetectorKind::TextClassifier,
            _ => DetectorKind::Other(value.trim().to_string()),
        }
    }
}

impl From<&str> for DetectorKind {
    fn from(value: &str) -> Self {
        DetectorKind::from(value.to_string())
    }
}

impl From<DetectorKind> for String {
    fn from(kind: DetectorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 2. 统一结果记录 (Normalized Result)
// ==========================================

/// 单个检测器的产出：要么有分数，要么带着失败原因缺席。
/// 用类型而不是 `null` 哨兵表达"不可用"，所有消费方都必须处理这条分支。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectorOutcome {
    /// score ∈ [0,100]（合成概率），confidence ∈ [0,1]
    Scored { score: f64, confidence: f64 },
    Unavailable { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorResult {
    pub source: DetectorKind,
    #[serde(flatten)]
    pub outcome: DetectorOutcome,
    /// 辅助诊断字段，聚合器不读取，只进审计记录
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// 未获分数时的默认置信度
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

impl DetectorResult {
    pub fn scored(source: impl Into<DetectorKind>, score: f64, confidence: f64) -> Self {
        debug_assert!((0.0..=100.0).contains(&score), "score out of range: {score}");
        debug_assert!(
            (0.0..=1.0).contains(&confidence),
            "confidence out of range: {confidence}"
        );
        Self {
            source: source.into(),
            outcome: DetectorOutcome::Scored { score, confidence },
            metadata: Map::new(),
        }
    }

    pub fn unavailable(source: impl Into<DetectorKind>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            outcome: DetectorOutcome::Unavailable {
                error: error.into(),
            },
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn score(&self) -> Option<f64> {
        match self.outcome {
            DetectorOutcome::Scored { score, .. } => Some(score),
            DetectorOutcome::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.outcome, DetectorOutcome::Scored { .. })
    }

    /// 把适配器 / 客户端提交的松散记录规整成 `DetectorResult`
    ///
    /// 规则：
    /// - 无分数 → 不可用，原因取 `error`，否则 "no score reported"
    /// - 分数非数值、非有限或超出 [0,100] → 不可用（绝不让脏数据进入加权和）
    /// - 置信度缺省为 0.5；非数值 → 不可用；超出 [0,1] → 截断
    pub fn normalize(raw: RawDetection) -> Self {
        let RawDetection {
            source,
            score,
            confidence,
            metadata,
            error,
        } = raw;

        let outcome = match score.filter(|v| !v.is_null()) {
            None => DetectorOutcome::Unavailable {
                error: error.unwrap_or_else(|| "no score reported".to_string()),
            },
            Some(value) => match as_finite(&value) {
                Some(score) if (0.0..=100.0).contains(&score) => {
                    match confidence.filter(|v| !v.is_null()) {
                        None => DetectorOutcome::Scored {
                            score,
                            confidence: NEUTRAL_CONFIDENCE,
                        },
                        Some(c) => match as_finite(&c) {
                            Some(c) => DetectorOutcome::Scored {
                                score,
                                confidence: c.clamp(0.0, 1.0),
                            },
                            None => DetectorOutcome::Unavailable {
                                error: format!("malformed confidence: {c}"),
                            },
                        },
                    }
                }
                _ => DetectorOutcome::Unavailable {
                    error: format!("malformed score: {value}"),
                },
            },
        };

        Self {
            source,
            outcome,
            metadata,
        }
    }
}

fn as_finite(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// 同一次运行里每个来源只能出现一次
///
/// 保留第一条，后续同源记录改判为不可用（`duplicate source`）。
pub fn dedupe_sources(results: Vec<DetectorResult>) -> Vec<DetectorResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .map(|result| {
            if seen.insert(result.source.clone()) {
                return result;
            }
            DetectorResult {
                outcome: DetectorOutcome::Unavailable {
                    error: "duplicate source".to_string(),
                },
                ..result
            }
        })
        .collect()
}

/// 适配器 / 前端提交的原始检测记录（线上格式）
///
/// 数值字段保留为 `Value`，这样 `"abc"` 之类的脏值能在规整阶段
/// 被判为不可用，而不是让整个请求反序列化失败。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    pub source: DetectorKind,
    #[serde(default)]
    pub score: Option<Value>,
    #[serde(default)]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RawDetection {
    pub fn new(source: impl Into<DetectorKind>) -> Self {
        Self {
            source: source.into(),
            score: None,
            confidence: None,
            metadata: Map::new(),
            error: None,
        }
    }

    pub fn with_score(mut self, score: f64, confidence: f64) -> Self {
        self.score = Some(Value::from(score));
        self.confidence = Some(Value::from(confidence));
        self
    }
}

// ==========================================
// 3. 待检媒体 (Media)
// ==========================================

/// 媒体引用：远程 URL 或内联字节
#[derive(Debug, Clone)]
pub enum MediaRef {
    Url(String),
    Inline {
        bytes: Vec<u8>,
        mime: Option<String>,
    },
}

/// 一次核验请求的输入：一张图片，可选附带文本
#[derive(Debug, Clone)]
pub struct Media {
    pub reference: MediaRef,
    pub text: Option<String>,
}

impl Media {
    pub fn inline(bytes: Vec<u8>) -> Self {
        Self {
            reference: MediaRef::Inline { bytes, mime: None },
            text: None,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            reference: MediaRef::Url(url.into()),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.reference {
            MediaRef::Inline { bytes, .. } => Some(bytes),
            MediaRef::Url(_) => None,
        }
    }
}

// ==========================================
// 4. 适配器契约 (Adapter Contract)
// ==========================================

/// 检测器适配器
///
/// 实现方只负责"调用 + 解析"，返回原始记录或错误；
/// 流水线负责超时、规整，以及把任何 `Err` 转成不可用结果。
#[async_trait]
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    async fn detect(&self, media: &Media) -> Result<RawDetection, AdapterError>;
}
