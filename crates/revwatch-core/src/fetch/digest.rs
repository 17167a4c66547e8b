//! Artifact digests in `<algorithm>:<hex>` form.

use std::fmt;
use std::str::FromStr;

use sha2::Digest as _;

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
            DigestAlgorithm::Blake3 => "blake3",
        }
    }

    /// Length of the hex encoded output.
    fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha256 | DigestAlgorithm::Blake3 => 64,
            DigestAlgorithm::Sha384 => 96,
            DigestAlgorithm::Sha512 => 128,
        }
    }

    fn hash_hex(self, data: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha256 => hex::encode(sha2::Sha256::digest(data)),
            DigestAlgorithm::Sha384 => hex::encode(sha2::Sha384::digest(data)),
            DigestAlgorithm::Sha512 => hex::encode(sha2::Sha512::digest(data)),
            DigestAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            "blake3" => Ok(DigestAlgorithm::Blake3),
            other => Err(format!("unsupported algorithm '{}'", other)),
        }
    }
}

/// Expected or computed content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    /// Lower-case hex
    encoded: String,
}

impl Digest {
    /// Hash `data` with `algorithm`.
    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            encoded: algorithm.hash_hex(data),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Check `data` against this digest.
    pub fn verify(&self, data: &[u8]) -> Result<(), FetchError> {
        let actual = Digest::compute(self.algorithm, data);
        if actual != *self {
            return Err(FetchError::Integrity {
                expected: self.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

impl FromStr for Digest {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| FetchError::InvalidDigest {
            digest: s.to_string(),
            reason,
        };

        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected <algorithm>:<hex>".to_string()))?;
        let algorithm: DigestAlgorithm = algorithm.parse().map_err(invalid)?;

        if encoded.len() != algorithm.hex_len()
            || !encoded.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(invalid(format!(
                "expected {} hex characters for {}",
                algorithm.hex_len(),
                algorithm.name()
            )));
        }

        Ok(Self {
            algorithm,
            encoded: encoded.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.encoded)
    }
}
