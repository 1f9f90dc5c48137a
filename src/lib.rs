//! 鉴真 (Jianzhen) —— 媒体真伪核验核心
//!
//! 溯源凭证优先，其次对多个互相独立、各有缺陷的检测器做加权集成，
//! 最终给出五级判定、量化置信度与完整审计链。

pub mod adapters;
pub mod api;
pub mod config;
pub mod detector;
pub mod ensemble;
pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod pipeline;
pub mod provenance;
pub mod signer;
pub mod variance;
pub mod verdict;

pub use config::{Config, DecisionThresholds, DominantSignalPolicy, EnsembleConfig};
pub use detector::{
    Detector, DetectorKind, DetectorOutcome, DetectorResult, Media, MediaRef, RawDetection,
};
pub use ensemble::{EnsembleAggregator, EnsembleResult};
pub use error::{AdapterError, ConfigError};
pub use evidence::{Summary, VerificationReport};
pub use pipeline::VerificationPipeline;
pub use provenance::{ProvenanceChecker, ProvenanceResult};
pub use verdict::{
    Comparison, DecisionEngine, DecisionRule, Recommendation, Verdict, VerdictDecision,
};
