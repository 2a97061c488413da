//! Verifier capability trait and the two reference implementations named
//! in spec.md §4.1: the sha256sums manifest verifier and the
//! Ed25519/PEM detached-signature verifier.
//!
//! Reimplemented as a small capability trait per spec.md §9's guidance on
//! the source's inheritance chains — one method, composed by holding a
//! `Box<dyn Verifier>` in the Downloader's verifier list, rather than a
//! class hierarchy.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::UpdateError;

/// A predicate over the full set of files a single `get()` call downloaded
/// (keyed by filename), checked against the primary artifact's filename.
/// Side-effect-free on the filesystem (spec.md V2).
pub trait Verifier: Send + Sync {
    /// Filenames, beyond the primary, this verifier needs fetched first.
    fn required_auxiliary_files(&self) -> Vec<String>;

    /// Verify `primary_filename` against the downloaded file set. `files`
    /// maps every downloaded filename (primary and auxiliary) to its path
    /// on disk.
    fn verify(&self, primary_filename: &str, files: &HashMap<String, PathBuf>) -> Result<(), UpdateError>;
}

/// Verifies the primary file's SHA-256 digest against an entry in a
/// `sha256sums`-format manifest (spec.md §4.1, §6).
pub struct ManifestVerifier {
    manifest_filename: String,
}

impl ManifestVerifier {
    pub fn new(manifest_filename: impl Into<String>) -> Self {
        Self {
            manifest_filename: manifest_filename.into(),
        }
    }
}

impl Verifier for ManifestVerifier {
    fn required_auxiliary_files(&self) -> Vec<String> {
        vec![self.manifest_filename.clone()]
    }

    fn verify(&self, primary_filename: &str, files: &HashMap<String, PathBuf>) -> Result<(), UpdateError> {
        let manifest_path = files.get(&self.manifest_filename).ok_or_else(|| {
            UpdateError::verification_failed(format!(
                "manifest file '{}' was not downloaded",
                self.manifest_filename
            ))
        })?;
        let primary_path = files.get(primary_filename).ok_or_else(|| {
            UpdateError::verification_failed(format!("primary file '{primary_filename}' was not downloaded"))
        })?;

        let entries = parse_manifest(manifest_path).map_err(|e| {
            UpdateError::verification_failed(format!("could not parse manifest: {e}"))
        })?;

        let manifest_base = manifest_path.parent().unwrap_or_else(|| Path::new(""));
        let primary_abs = primary_path
            .canonicalize()
            .unwrap_or_else(|_| primary_path.clone());

        let expected = entries
            .iter()
            .find(|(_, path)| {
                let candidate = manifest_base.join(path);
                candidate
                    .canonicalize()
                    .map(|c| c == primary_abs)
                    .unwrap_or_else(|_| candidate == *primary_path)
            })
            .map(|(hash, _)| hash.clone())
            .ok_or_else(|| {
                UpdateError::verification_failed(format!(
                    "manifest has no entry for '{primary_filename}'"
                ))
            })?;

        let actual = sha256_hex(primary_path).map_err(|e| {
            UpdateError::verification_failed(format!("could not hash '{primary_filename}': {e}"))
        })?;

        if actual.eq_ignore_ascii_case(&expected) {
            Ok(())
        } else {
            Err(UpdateError::verification_failed(format!(
                "hash mismatch for '{primary_filename}': expected {expected}, got {actual}"
            )))
        }
    }
}

/// Parse `SHA256SUMS`-compatible lines: `<hex64> SP "*" <path>`. Blank
/// lines and CR are skipped. Per spec.md §9's open question, the final
/// entry is emitted even when the file lacks a trailing newline — unlike
/// a state machine that only emits on a line-terminator transition.
fn parse_manifest(path: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let raw = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, " *");
        let hash = parts.next().unwrap_or_default();
        let rest = parts.next();
        let (hash, rel_path) = match rest {
            Some(rel_path) => (hash, rel_path),
            None => {
                // tolerate a single space before the path (no binary marker)
                let mut fallback = line.splitn(2, ' ');
                let hash = fallback.next().unwrap_or_default();
                let rel_path = fallback.next().unwrap_or_default();
                (hash, rel_path)
            }
        };
        if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            anyhow::bail!("malformed hash on line {line:?}");
        }
        let native_path = rel_path.replace('/', &std::path::MAIN_SEPARATOR.to_string());
        entries.push((hash.to_string(), PathBuf::from(native_path)));
    }
    Ok(entries)
}

fn sha256_hex(path: &Path) -> anyhow::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Key formats `SignatureVerifier` understands. Only `Pem`/`Ed25519` are
/// implemented; the variants exist so misconfiguration (an unsupported
/// combination) is a typed, rejectable value rather than a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Pem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ed25519,
}

/// Verifies a detached signature over a message file against one or more
/// configured public keys; success requires at least one key to validate
/// (spec.md §4.1).
pub struct SignatureVerifier {
    key_format: KeyFormat,
    key_type: KeyType,
    public_keys_pem: Vec<String>,
    message_filename: String,
    signature_filename: String,
}

impl SignatureVerifier {
    pub fn new(
        key_format: KeyFormat,
        key_type: KeyType,
        public_keys_pem: Vec<String>,
        message_filename: impl Into<String>,
        signature_filename: impl Into<String>,
    ) -> Self {
        Self {
            key_format,
            key_type,
            public_keys_pem,
            message_filename: message_filename.into(),
            signature_filename: signature_filename.into(),
        }
    }

    fn decode_keys(&self) -> Result<Vec<VerifyingKey>, UpdateError> {
        let KeyFormat::Pem = self.key_format;
        let KeyType::Ed25519 = self.key_type;

        self.public_keys_pem
            .iter()
            .map(|raw| {
                let parsed = pem::parse(raw.as_bytes()).map_err(|e| {
                    UpdateError::misconfigured(format!("malformed PEM public key: {e}"))
                })?;
                let bytes: [u8; 32] = parsed.contents().try_into().map_err(|_| {
                    UpdateError::misconfigured("PEM public key is not 32 bytes (Ed25519)")
                })?;
                VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| UpdateError::misconfigured(format!("invalid Ed25519 public key: {e}")))
            })
            .collect()
    }
}

impl Verifier for SignatureVerifier {
    fn required_auxiliary_files(&self) -> Vec<String> {
        vec![self.message_filename.clone(), self.signature_filename.clone()]
    }

    fn verify(&self, _primary_filename: &str, files: &HashMap<String, PathBuf>) -> Result<(), UpdateError> {
        let message_path = files.get(&self.message_filename).ok_or_else(|| {
            UpdateError::verification_failed(format!(
                "message file '{}' was not downloaded",
                self.message_filename
            ))
        })?;
        let signature_path = files.get(&self.signature_filename).ok_or_else(|| {
            UpdateError::verification_failed(format!(
                "signature file '{}' was not downloaded",
                self.signature_filename
            ))
        })?;

        let message = fs::read(message_path).map_err(|e| {
            UpdateError::verification_failed(format!("could not read message file: {e}"))
        })?;
        let signature_bytes = fs::read(signature_path).map_err(|e| {
            UpdateError::verification_failed(format!("could not read signature file: {e}"))
        })?;
        let signature_bytes: [u8; 64] = signature_bytes.as_slice().try_into().map_err(|_| {
            UpdateError::verification_failed("signature is not 64 bytes (Ed25519)")
        })?;
        let signature = Signature::from_bytes(&signature_bytes);

        let keys = self.decode_keys()?;
        if keys.is_empty() {
            return Err(UpdateError::misconfigured("no public keys configured"));
        }

        let any_verified = keys
            .iter()
            .any(|key| key.verify(&message, &signature).is_ok());

        if any_verified {
            Ok(())
        } else {
            Err(UpdateError::verification_failed(
                "signature did not validate under any configured key",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use tempfile::tempdir;

    #[test]
    fn manifest_verifier_accepts_matching_hash() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("release-1.2.3.zip");
        fs::write(&primary, b"payload").unwrap();
        let hash = sha256_hex(&primary).unwrap();
        let manifest = dir.path().join("sha256sums");
        fs::write(&manifest, format!("{hash} *release-1.2.3.zip\n")).unwrap();

        let mut files = HashMap::new();
        files.insert("release-1.2.3.zip".to_string(), primary);
        files.insert("sha256sums".to_string(), manifest);

        let verifier = ManifestVerifier::new("sha256sums");
        assert!(verifier.verify("release-1.2.3.zip", &files).is_ok());
    }

    #[test]
    fn manifest_verifier_rejects_hash_mismatch() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("release-1.2.3.zip");
        fs::write(&primary, b"payload").unwrap();
        let manifest = dir.path().join("sha256sums");
        fs::write(&manifest, format!("{} *release-1.2.3.zip\n", "0".repeat(64))).unwrap();

        let mut files = HashMap::new();
        files.insert("release-1.2.3.zip".to_string(), primary);
        files.insert("sha256sums".to_string(), manifest);

        let verifier = ManifestVerifier::new("sha256sums");
        assert!(verifier.verify("release-1.2.3.zip", &files).is_err());
    }

    #[test]
    fn manifest_verifier_emits_final_entry_without_trailing_newline() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("a.bin");
        fs::write(&primary, b"data").unwrap();
        let hash = sha256_hex(&primary).unwrap();
        let manifest = dir.path().join("sha256sums");
        // deliberately no trailing newline
        fs::write(&manifest, format!("{hash} *a.bin")).unwrap();

        let mut files = HashMap::new();
        files.insert("a.bin".to_string(), primary);
        files.insert("sha256sums".to_string(), manifest);

        let verifier = ManifestVerifier::new("sha256sums");
        assert!(verifier.verify("a.bin", &files).is_ok());
    }

    #[test]
    fn signature_verifier_accepts_valid_signature_from_any_configured_key() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying_key = signing_key.verifying_key();
        let pem_text = pem::encode(&pem::Pem::new("PUBLIC KEY", verifying_key.to_bytes().to_vec()));

        let dir = tempdir().unwrap();
        let message_path = dir.path().join("sha256sums");
        fs::write(&message_path, b"manifest bytes").unwrap();
        let signature = signing_key.sign(b"manifest bytes");
        let signature_path = dir.path().join("sha256sums.sig");
        fs::write(&signature_path, signature.to_bytes()).unwrap();

        let mut files = HashMap::new();
        files.insert("sha256sums".to_string(), message_path);
        files.insert("sha256sums.sig".to_string(), signature_path);

        let verifier = SignatureVerifier::new(
            KeyFormat::Pem,
            KeyType::Ed25519,
            vec![pem_text],
            "sha256sums",
            "sha256sums.sig",
        );
        assert!(verifier.verify("release.zip", &files).is_ok());
    }

    #[test]
    fn signature_verifier_rejects_when_no_key_matches() {
        let signing_key = SigningKey::from_bytes(&[9u8; 32]);
        let other_key = SigningKey::from_bytes(&[11u8; 32]).verifying_key();
        let pem_text = pem::encode(&pem::Pem::new("PUBLIC KEY", other_key.to_bytes().to_vec()));

        let dir = tempdir().unwrap();
        let message_path = dir.path().join("sha256sums");
        fs::write(&message_path, b"manifest bytes").unwrap();
        let signature = signing_key.sign(b"manifest bytes");
        let signature_path = dir.path().join("sha256sums.sig");
        fs::write(&signature_path, signature.to_bytes()).unwrap();

        let mut files = HashMap::new();
        files.insert("sha256sums".to_string(), message_path);
        files.insert("sha256sums.sig".to_string(), signature_path);

        let verifier = SignatureVerifier::new(
            KeyFormat::Pem,
            KeyType::Ed25519,
            vec![pem_text],
            "sha256sums",
            "sha256sums.sig",
        );
        assert!(verifier.verify("release.zip", &files).is_err());
    }
}
