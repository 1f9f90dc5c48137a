//! 错误类型
//!
//! 只有两类真正的"错误"：启动期配置错误、以及检测适配器的调用失败。
//! 后者在流水线边界被转换为"不可用"的检测结果，永远不会抛给调用方。

use thiserror::Error;

/// 配置加载 / 校验失败
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量无法解析
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidVar {
        key: String,
        value: String,
        reason: String,
    },

    /// 权重超出 [0,1]
    #[error("weight for `{detector}` must be within [0,1], got {weight}")]
    WeightOutOfRange { detector: String, weight: f64 },

    /// 权重表总和不为 1
    #[error("detector weights must sum to 1.0, got {sum:.6}")]
    WeightSum { sum: f64 },

    /// 主检测器不在权重表里
    #[error("primary detector `{0}` has no entry in the weight table")]
    MissingPrimary(String),
}

/// 单个检测器 / 溯源服务调用失败
#[derive(Debug, Error)]
pub enum AdapterError {
    /// 网络层错误（连接、超时、TLS）
    #[error("transport error: {0}")]
    Transport(String),

    /// 服务端返回非 2xx
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 响应体无法解析
    #[error("malformed provider payload: {0}")]
    Payload(String),

    /// 该适配器无法处理此类媒体
    #[error("unsupported media: {0}")]
    Unsupported(String),

    /// 未配置端点
    #[error("detector `{0}` is not configured")]
    NotConfigured(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdapterError::Payload(err.to_string())
        } else {
            AdapterError::Transport(err.to_string())
        }
    }
}
