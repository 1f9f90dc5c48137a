use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::detector::Media;

/// 溯源凭证检查结果（C2PA 一类的加密清单）
///
/// "未找到凭证"是正常结果，不是错误。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceResult {
    pub has_credentials: bool,
    /// 仅在 `has_credentials` 为真时有意义
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<String>,
}

impl ProvenanceResult {
    /// 未发现任何凭证
    pub fn absent() -> Self {
        Self {
            has_credentials: false,
            is_valid: false,
            issuer: None,
            signed_at: None,
        }
    }

    /// 存在且验证通过的凭证
    pub fn verified(issuer: impl Into<String>, signed_at: Option<String>) -> Self {
        Self {
            has_credentials: true,
            is_valid: true,
            issuer: Some(issuer.into()),
            signed_at,
        }
    }

    /// 有清单但验证失败（被篡改或签名链断裂）
    pub fn invalid(issuer: Option<String>) -> Self {
        Self {
            has_credentials: true,
            is_valid: false,
            issuer,
            signed_at: None,
        }
    }

    /// 来源可信：`has_credentials && is_valid`
    pub fn is_verified(&self) -> bool {
        self.has_credentials && self.is_valid
    }

    /// 修正外部输入里 "无凭证却有效" 的矛盾组合
    pub fn sanitized(mut self) -> Self {
        if !self.has_credentials {
            self.is_valid = false;
        }
        self
    }
}

/// 溯源协作方
///
/// 只有灾难性 IO 失败才返回 `Err`；流水线记录后按"无溯源"继续。
#[async_trait]
pub trait ProvenanceChecker: Send + Sync {
    async fn check(&self, media: &Media) -> anyhow::Result<ProvenanceResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_without_credentials_is_never_verified() {
        let contradictory = ProvenanceResult {
            has_credentials: false,
            is_valid: true,
            issuer: None,
            signed_at: None,
        };
        assert!(!contradictory.is_verified());
        assert!(!contradictory.sanitized().is_valid);
    }

    #[test]
    fn wire_format_is_camel_case() {
        let p = ProvenanceResult::verified("Adobe", Some("2024-03-01T10:00:00Z".to_string()));
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["hasCredentials"], true);
        assert_eq!(v["isValid"], true);
        assert_eq!(v["signedAt"], "2024-03-01T10:00:00Z");

        let parsed: ProvenanceResult =
            serde_json::from_str(r#"{"hasCredentials": false}"#).unwrap();
        assert_eq!(parsed, ProvenanceResult::absent());
    }
}
