use std::fs;
use std::path::Path;

use anyhow::Context;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng; // 生成私钥用的安全随机数源
use serde::Serialize;
use tracing::info;

use crate::evidence::VerificationReport;

/// 签名器
/// 负责为核验报告出具可验证的签名，报告一旦交付即不可抵赖
pub struct ReportSigner {
    keypair: SigningKey,
}

/// 带签名的报告（十六进制编码）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestedReport {
    pub report: VerificationReport,
    pub signature: String,
    pub public_key: String,
}

impl ReportSigner {
    /// 随机生成新密钥（测试 / 临时实例用）
    pub fn generate() -> Self {
        Self {
            keypair: SigningKey::generate(&mut OsRng),
        }
    }

    /// 从文件加载私钥；文件不存在时生成并写入
    ///
    /// 文件内容为 32 字节私钥种子的十六进制。
    pub fn load_or_generate(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading signing key {}", path.display()))?;
            let bytes = hex::decode(raw.trim()).context("signing key is not valid hex")?;
            let seed: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("signing key must be 32 bytes, got {}", bytes.len()))?;
            info!(path = %path.display(), "🔑 已加载签名密钥");
            return Ok(Self {
                keypair: SigningKey::from_bytes(&seed),
            });
        }

        let signer = Self::generate();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, hex::encode(signer.keypair.to_bytes()))
            .with_context(|| format!("writing signing key {}", path.display()))?;
        info!(path = %path.display(), "🔑 已生成新的签名密钥");
        Ok(signer)
    }

    /// 公钥（分发给审计方验签）
    pub fn public_key(&self) -> VerifyingKey {
        self.keypair.verifying_key()
    }

    /// 对报告签名，返回 64 字节 Ed25519 签名
    ///
    /// 注意：依赖 serde_json 输出的稳定性；结构体字段顺序固定，因此同一报告得到同一载荷。
    pub fn sign(&self, report: &VerificationReport) -> anyhow::Result<Signature> {
        let payload = serde_json::to_vec(report)?;
        Ok(self.keypair.sign(&payload))
    }

    pub fn attest(&self, report: VerificationReport) -> anyhow::Result<AttestedReport> {
        let signature = self.sign(&report)?;
        Ok(AttestedReport {
            report,
            signature: hex::encode(signature.to_bytes()),
            public_key: hex::encode(self.public_key().to_bytes()),
        })
    }

    /// 静态验证函数（给外部验证者使用）
    pub fn verify(
        verification_key: &VerifyingKey,
        report: &VerificationReport,
        signature: &Signature,
    ) -> anyhow::Result<bool> {
        let payload = serde_json::to_vec(report)?;
        Ok(verification_key.verify(&payload, signature).is_ok())
    }
}
