//! 청크 내용 다이제스트
//!
//! 서버측 무결성 검증용. 코어는 해시를 직접 계산하지 않고 주입된 구현을 호출한다.

use sha2::{Digest, Sha256};

/// 바이트 버퍼 -> 고정 길이 hex 문자열
pub trait ContentDigest: Send + Sync {
    fn digest(&self, data: &[u8]) -> String;
}

/// SHA-256 다이제스트 (64자 hex)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl ContentDigest for Sha256Digest {
    fn digest(&self, data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_deterministic() {
        let d = Sha256Digest;
        let a = d.digest(b"hello world");
        assert_eq!(a, d.digest(b"hello world"));
        assert_eq!(a.len(), 64);
        assert_eq!(
            a,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_ne!(a, d.digest(b"hello world!"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            Sha256Digest.digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
