//! Content integrity checks for downloaded archives.
//!
//! The version pinned in a versions file doubles as the archive digest, in
//! one of two encodings chosen by length:
//!
//! - 40 characters: SHA-1, hex
//! - 44 characters: SHA-256, URL-safe base64 without padding
//!
//! Anything else is rejected before the file is opened.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::runtime::Runtime;

const SHA1_HEX_LEN: usize = 40;
const SHA256_ID_LEN: usize = 44;
const SHA256_LEN: usize = 32;

/// Standard alphabet, accepting input with or without padding.
const STANDARD_ANY_PAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("unknown digest format (length {len}): {declared}")]
    UnknownFormat { len: usize, declared: String },

    #[error("malformed sha256 digest: {declared}")]
    Malformed { declared: String },

    #[error("{algorithm} mismatch: expected {expected}, computed {actual}")]
    Mismatch {
        algorithm: &'static str,
        expected: String,
        actual: String,
    },

    #[error("failed to read {}: {cause:#}", .path.display())]
    Io { path: PathBuf, cause: anyhow::Error },
}

/// A declared digest, decoded according to its encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedDigest {
    /// Lower-cased hex.
    Sha1(String),
    Sha256([u8; SHA256_LEN]),
}

impl ExpectedDigest {
    /// Decodes `declared`, dispatching strictly on its length.
    pub fn parse(declared: &str) -> Result<Self, DigestError> {
        match declared.len() {
            SHA1_HEX_LEN => Ok(ExpectedDigest::Sha1(declared.to_ascii_lowercase())),
            SHA256_ID_LEN => decode_sha256(declared).map(ExpectedDigest::Sha256),
            len => Err(DigestError::UnknownFormat {
                len,
                declared: declared.to_string(),
            }),
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            ExpectedDigest::Sha1(_) => "sha1",
            ExpectedDigest::Sha256(_) => "sha256",
        }
    }
}

/// Base64url → standard alphabet, then decode.
///
/// 44 characters carry 33 bytes; the byte after the 32-byte digest is the
/// package tool's hash-algorithm tag and is not part of the digest.
fn decode_sha256(declared: &str) -> Result<[u8; SHA256_LEN], DigestError> {
    let malformed = || DigestError::Malformed {
        declared: declared.to_string(),
    };
    let standard: String = declared
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    let bytes = STANDARD_ANY_PAD.decode(standard).map_err(|_| malformed())?;
    match bytes.len() {
        SHA256_LEN | 33 => bytes[..SHA256_LEN].try_into().map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

/// Checks the content of `path` against `declared`.
#[tracing::instrument(skip(runtime))]
pub fn verify_file<R: Runtime>(
    runtime: &R,
    path: &Path,
    declared: &str,
) -> Result<(), DigestError> {
    let expected = ExpectedDigest::parse(declared)?;
    let io_error = |cause: anyhow::Error| DigestError::Io {
        path: path.to_path_buf(),
        cause,
    };
    let reader = runtime.open(path).map_err(io_error)?;

    match expected {
        ExpectedDigest::Sha1(expected_hex) => {
            let actual = hex::encode(hash_reader::<Sha1>(reader).map_err(io_error)?);
            if actual != expected_hex {
                return Err(DigestError::Mismatch {
                    algorithm: "sha1",
                    expected: declared.to_string(),
                    actual,
                });
            }
        }
        ExpectedDigest::Sha256(expected_bytes) => {
            let actual = hash_reader::<Sha256>(reader).map_err(io_error)?;
            if actual.as_slice() != expected_bytes.as_slice() {
                return Err(DigestError::Mismatch {
                    algorithm: "sha256",
                    expected: declared.to_string(),
                    actual: URL_SAFE_NO_PAD.encode(actual),
                });
            }
        }
    }
    Ok(())
}

fn hash_reader<D: Digest>(mut reader: Box<dyn Read + Send>) -> anyhow::Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize().to_vec())
}
