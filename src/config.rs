use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::detector::DetectorKind;
use crate::error::ConfigError;

/// 权重表求和的容差
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ==========================================
// 1. 集成策略常量 (Ensemble Policy)
// ==========================================

/// 主信号增强策略
///
/// 经验规则，没有推导依据：主检测器高置信且给出极端分数时，
/// 固定其权重为 0.70，其余可用检测器权重减半。
/// 保持这组数值以兼容既有判定结果，调整时视为可调策略而非算法。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DominantSignalPolicy {
    pub min_confidence: f64,
    /// score ≤ low_extreme 视为强"真实"信号
    pub low_extreme: f64,
    /// score ≥ high_extreme 视为强"合成"信号
    pub high_extreme: f64,
    pub boosted_weight: f64,
    pub other_weight_factor: f64,
}

impl Default for DominantSignalPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.80,
            low_extreme: 25.0,
            high_extreme: 75.0,
            boosted_weight: 0.70,
            other_weight_factor: 0.5,
        }
    }
}

/// 聚合器的静态配置：构造时注入，不存在全局可变状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleConfig {
    pub weights: BTreeMap<DetectorKind, f64>,
    /// 未登记来源的兜底权重
    pub fallback_weight: f64,
    /// 唯一有资格触发增强的检测器
    pub primary: DetectorKind,
    pub dominant: DominantSignalPolicy,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        let weights = BTreeMap::from([
            (DetectorKind::VisionModel, 0.45),
            (DetectorKind::ArtifactForensics, 0.20),
            (DetectorKind::FrequencyAnalysis, 0.15),
            (DetectorKind::TextClassifier, 0.20),
        ]);
        Self {
            weights,
            fallback_weight: 0.10,
            primary: DetectorKind::VisionModel,
            dominant: DominantSignalPolicy::default(),
        }
    }
}

impl EnsembleConfig {
    /// 用另一张权重表替换默认表，主检测器取权重最高者
    pub fn with_weights<I, K>(weights: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<DetectorKind>,
    {
        let weights: BTreeMap<DetectorKind, f64> =
            weights.into_iter().map(|(k, w)| (k.into(), w)).collect();
        let primary = weights
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k.clone())
            .unwrap_or(DetectorKind::VisionModel);
        Self {
            weights,
            primary,
            ..Self::default()
        }
    }

    pub fn weight_for(&self, kind: &DetectorKind) -> f64 {
        self.weights
            .get(kind)
            .copied()
            .unwrap_or(self.fallback_weight)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, weight) in self
            .weights
            .iter()
            .map(|(k, w)| (k.to_string(), *w))
            .chain(std::iter::once(("<fallback>".to_string(), self.fallback_weight)))
        {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::WeightOutOfRange {
                    detector: kind,
                    weight,
                });
            }
        }
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum { sum });
        }
        if !self.weights.contains_key(&self.primary) {
            return Err(ConfigError::MissingPrimary(self.primary.to_string()));
        }
        Ok(())
    }
}

/// 判定格阈值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionThresholds {
    /// variance 严格大于此值 → 分歧过大
    pub high_disagreement: f64,
    /// variance 严格小于此值才允许给出倾向性判定
    pub low_disagreement: f64,
    pub authentic_below: f64,
    pub synthetic_above: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            high_disagreement: 25.0,
            low_disagreement: 15.0,
            authentic_below: 30.0,
            synthetic_above: 70.0,
        }
    }
}

// ==========================================
// 2. 服务配置 (Service Config)
// ==========================================

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub key_path: String,
    pub detector_timeout: Duration,
    pub provenance_url: Option<String>,
    /// 每个已登记检测器一项；未配置端点的检测器仍参与扇出并报告不可用
    pub detector_urls: Vec<(DetectorKind, Option<String>)>,
    pub ensemble: EnsembleConfig,
    pub thresholds: DecisionThresholds,
    /// `image_path` 只允许落在此目录内；为空表示开发模式，不做限制
    pub media_root: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源加载（测试里不必改动进程环境变量）
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
                key: "PORT".to_string(),
                value: raw.clone(),
                reason: "must be a port number".to_string(),
            })?,
            None => 3000,
        };

        let timeout_ms: u64 = match var("DETECTOR_TIMEOUT_MS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
                key: "DETECTOR_TIMEOUT_MS".to_string(),
                value: raw.clone(),
                reason: "must be milliseconds".to_string(),
            })?,
            None => 15_000,
        };

        let mut ensemble = match var("DETECTOR_WEIGHTS") {
            Some(raw) => EnsembleConfig::with_weights(parse_weights(&raw)?),
            None => EnsembleConfig::default(),
        };
        if let Some(raw) = var("FALLBACK_WEIGHT") {
            ensemble.fallback_weight =
                raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
                    key: "FALLBACK_WEIGHT".to_string(),
                    value: raw.clone(),
                    reason: "must be a number".to_string(),
                })?;
        }
        if let Some(raw) = var("PRIMARY_DETECTOR") {
            ensemble.primary = DetectorKind::from(raw);
        }
        ensemble.validate()?;

        // 扇出列表 = 已登记种类 ∪ 权重表中的自定义种类
        let mut kinds: Vec<DetectorKind> = DetectorKind::KNOWN.to_vec();
        for kind in ensemble.weights.keys() {
            if !kinds.contains(kind) {
                kinds.push(kind.clone());
            }
        }
        let detector_urls = kinds
            .into_iter()
            .map(|kind| {
                let url = var(&format!("DETECTOR_{}_URL", kind.env_key()));
                (kind, url)
            })
            .collect();

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            key_path: var("KEY_PATH").unwrap_or_else(|| "jianzhen.key".to_string()),
            detector_timeout: Duration::from_millis(timeout_ms),
            provenance_url: var("PROVENANCE_URL"),
            detector_urls,
            ensemble,
            thresholds: DecisionThresholds::default(),
            media_root: var("MEDIA_ROOT").map(PathBuf::from),
        })
    }
}

/// 解析 `kind=weight,kind=weight`
fn parse_weights(raw: &str) -> Result<Vec<(DetectorKind, f64)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let invalid = |reason: &str| ConfigError::InvalidVar {
                key: "DETECTOR_WEIGHTS".to_string(),
                value: pair.to_string(),
                reason: reason.to_string(),
            };
            let (kind, weight) = pair
                .split_once('=')
                .ok_or_else(|| invalid("expected kind=weight"))?;
            let weight: f64 = weight
                .trim()
                .parse()
                .map_err(|_| invalid("weight must be a number"))?;
            Ok::<_, ConfigError>((DetectorKind::from(kind), weight))
        })
        .collect()
}
