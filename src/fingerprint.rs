use img_hash::{HashAlg, HasherConfig}; // pHash 的配置器和算法枚举
use serde::Serialize;
use sha2::{Digest, Sha256};

/// 媒体指纹，写入审计记录
///
/// - `sha256`：原始完整性。改动一个字节都会雪崩式变化，用来防"调包"。
/// - `phash`：内容同一性。经过压缩、轻微裁剪后依然相近；非图片（或无法解码）时为 `None`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFingerprint {
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phash: Option<String>,
    pub byte_len: usize,
}

/// 计算内联媒体的指纹
///
/// CPU 密集型，调用方应放到 `spawn_blocking` 中执行。
pub fn fingerprint_bytes(bytes: &[u8]) -> MediaFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    // `{:x}`：32 字节摘要转小写十六进制
    let sha256 = format!("{:x}", hasher.finalize());

    // 解码失败不是错误：文本或不支持的格式只保留 SHA256
    let phash = img_hash::image::load_from_memory(bytes).ok().map(|img| {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Gradient) // 梯度算法：比均值算法对明暗变化更鲁棒
            .hash_size(8, 8) // 8x8 = 64 位指纹
            .to_hasher();
        hasher.hash_image(&img).to_base64()
    });

    MediaFingerprint {
        sha256,
        phash,
        byte_len: bytes.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_image_bytes_get_sha_only() {
        let fp = fingerprint_bytes(b"hello");
        assert_eq!(
            fp.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(fp.phash, None);
        assert_eq!(fp.byte_len, 5);
    }

    #[test]
    fn decodable_image_gets_perceptual_hash() {
        use img_hash::image::{DynamicImage, ImageOutputFormat, RgbImage};

        let img = RgbImage::from_fn(32, 32, |x, y| {
            img_hash::image::Rgb([(x * 8) as u8, (y * 8) as u8, 128])
        });
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut png, ImageOutputFormat::Png)
            .unwrap();

        let fp = fingerprint_bytes(&png);
        assert!(fp.phash.is_some());
        assert_eq!(fp.sha256.len(), 64);
    }
}
