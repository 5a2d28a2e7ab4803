//! Credential material for the gateway.
//!
//! Two kinds of bearer credential exist:
//! - the service token, generated at startup and written to a 0600 file
//! - principal keys, issued per principal and stored only as SHA-256 hashes

use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::Result;

/// Prefix on every issued principal key
pub const PRINCIPAL_KEY_PREFIX: &str = "igk_";
/// Characters of a principal key kept in clear for display
const DISPLAY_PREFIX_LEN: usize = 12;

/// Random 256-bit token shared with the process that fronts the gateway
#[derive(Debug, Clone)]
pub struct ServiceToken {
    token: [u8; 32],
}

impl ServiceToken {
    pub fn generate() -> Self {
        Self {
            token: rand::random(),
        }
    }

    /// Base64 form as presented in the `Authorization` header
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.token)
    }

    /// Write token to file with restricted permissions (0600)
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.encoded())?;
        fs::set_permissions(path, Permissions::from_mode(0o600))?;
        Ok(())
    }

    /// Check a presented credential. Compares every byte regardless of mismatch.
    pub fn verify(&self, candidate: &str) -> bool {
        let Ok(decoded) = STANDARD.decode(candidate.trim()) else {
            return false;
        };
        if decoded.len() != self.token.len() {
            return false;
        }
        decoded
            .iter()
            .zip(self.token.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// A freshly issued principal key. The raw key is shown once and never stored.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub raw: String,
    pub prefix: String,
    pub hash: String,
}

impl IssuedKey {
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        let raw = format!("{PRINCIPAL_KEY_PREFIX}{}", hex::encode(bytes));
        Self {
            prefix: raw[..DISPLAY_PREFIX_LEN].to_string(),
            hash: hash_key(&raw),
            raw,
        }
    }
}

/// SHA-256 hex digest used to look up principal keys
pub fn hash_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_service_token_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("service-token");

        let token = ServiceToken::generate();
        token.write_to_file(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let written = fs::read_to_string(&path).unwrap();
        assert!(token.verify(&written));
    }

    #[test]
    fn test_service_token_rejects_other_values() {
        let token = ServiceToken::generate();
        assert!(!token.verify(&ServiceToken::generate().encoded()));
        assert!(!token.verify("not base64!"));
        assert!(!token.verify(&STANDARD.encode(b"short")));
    }

    #[test]
    fn test_issued_key_shape() {
        let key = IssuedKey::generate();
        assert!(key.raw.starts_with(PRINCIPAL_KEY_PREFIX));
        assert_eq!(key.raw.len(), PRINCIPAL_KEY_PREFIX.len() + 64);
        assert!(key.raw.starts_with(&key.prefix));
        assert_eq!(key.hash, hash_key(&key.raw));
        assert_eq!(key.hash.len(), 64);
        assert_ne!(key.raw, IssuedKey::generate().raw);
    }
}
