use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    digest_hex(HashAlgorithm::Sha256, bytes)
}

pub fn digest_hex(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Md5 => hex::encode(Md5::digest(bytes)),
        HashAlgorithm::Sha1 => hex::encode(Sha1::digest(bytes)),
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        HashAlgorithm::Sha384 => hex::encode(Sha384::digest(bytes)),
        HashAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
    }
}

pub fn digest_reader_hex(algorithm: HashAlgorithm, reader: impl Read) -> Result<String> {
    match algorithm {
        HashAlgorithm::Md5 => stream_digest::<Md5>(reader),
        HashAlgorithm::Sha1 => stream_digest::<Sha1>(reader),
        HashAlgorithm::Sha256 => stream_digest::<Sha256>(reader),
        HashAlgorithm::Sha384 => stream_digest::<Sha384>(reader),
        HashAlgorithm::Sha512 => stream_digest::<Sha512>(reader),
    }
}

pub fn digest_file_hex(algorithm: HashAlgorithm, path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    digest_reader_hex(algorithm, BufReader::new(file))
        .with_context(|| format!("failed to hash {}", path.display()))
}

/// Compares a file digest with `expected` (hex, case-insensitive). Returns the
/// computed digest when it does not match.
pub fn verify_digest_file(
    algorithm: HashAlgorithm,
    path: &Path,
    expected: &str,
) -> Result<std::result::Result<(), String>> {
    let expected = expected.trim();
    if expected.is_empty() || !expected.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "expected {} digest is not hex: '{expected}'",
            algorithm.as_str()
        ));
    }

    let actual = digest_file_hex(algorithm, path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(Ok(()))
    } else {
        Ok(Err(actual))
    }
}

fn stream_digest<D: Digest>(mut reader: impl Read) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(sha256_hex(b""), EMPTY_SHA256);
    }

    #[test]
    fn md5_matches_known_vector() {
        assert_eq!(
            digest_hex(HashAlgorithm::Md5, b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn sha1_matches_known_vector() {
        assert_eq!(
            digest_hex(HashAlgorithm::Sha1, b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn streaming_digest_matches_one_shot_digest() {
        let payload = vec![7_u8; 200 * 1024];
        for algorithm in [
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            let streamed = digest_reader_hex(algorithm, Cursor::new(&payload))
                .expect("streaming digest must complete");
            assert_eq!(streamed, digest_hex(algorithm, &payload), "{algorithm:?}");
        }
    }

    #[test]
    fn parse_accepts_common_spellings() {
        assert_eq!(HashAlgorithm::parse("SHA256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::parse("sha-512"), Some(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::parse("md5"), Some(HashAlgorithm::Md5));
        assert_eq!(HashAlgorithm::parse("SHA-1"), Some(HashAlgorithm::Sha1));
        assert_eq!(HashAlgorithm::parse("crc32"), None);
    }

    #[test]
    fn verify_digest_file_reports_mismatch_with_actual_digest() {
        let path = std::env::temp_dir().join(format!(
            "cone-security-tests-{}-verify.bin",
            std::process::id()
        ));
        fs::write(&path, b"").expect("must write fixture");

        let ok = verify_digest_file(HashAlgorithm::Sha256, &path, &EMPTY_SHA256.to_uppercase())
            .expect("verification must complete");
        assert_eq!(ok, Ok(()));

        let mismatch = verify_digest_file(HashAlgorithm::Sha256, &path, "00")
            .expect("verification must complete");
        assert_eq!(mismatch, Err(EMPTY_SHA256.to_string()));

        assert!(verify_digest_file(HashAlgorithm::Sha256, &path, "not-hex").is_err());

        let _ = fs::remove_file(&path);
    }
}
