//! Scan result attestation.
//!
//! The canonical content is the item set sorted by path, each entry projected
//! to `{path, size}` and serialized with sorted keys; its SHA-256 is the
//! content hash. The signature covers the raw canonical bytes: Ed25519 with a
//! PEM keystore when the `ed25519` feature is on (the default), HMAC-SHA256
//! over a locally stored secret otherwise. Both produce the same envelope.

use crate::config::Config;
use crate::types::{Attestation, Item};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

#[derive(Serialize)]
struct CanonicalItem<'a> {
    path: &'a str,
    size: u64,
}

/// Canonical byte serialization of an item set.
pub fn canonical_content(items: &[Item]) -> Vec<u8> {
    let mut entries: Vec<(String, u64)> = items
        .iter()
        .map(|i| (i.path.to_string_lossy().into_owned(), i.size))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let projected: Vec<CanonicalItem<'_>> = entries
        .iter()
        .map(|(path, size)| CanonicalItem { path, size: *size })
        .collect();
    // Struct field order is path then size, which is also sorted-key order.
    serde_json::to_vec(&projected).unwrap_or_default()
}

/// Hex SHA-256 over the canonical content.
pub fn content_hash(items: &[Item]) -> String {
    hex::encode(Sha256::digest(canonical_content(items)))
}

/// Sign the item set, creating the keystore on first use.
pub fn sign_items(cfg: &Config, items: &[Item]) -> Result<Attestation> {
    let content = canonical_content(items);
    let hash = hex::encode(Sha256::digest(&content));
    let keys_dir = cfg.keys_dir();
    fs::create_dir_all(&keys_dir)
        .with_context(|| format!("creating keystore {}", keys_dir.display()))?;

    let (algorithm, signature, key_id) = sign_content(&keys_dir, &content)?;

    Ok(Attestation {
        algorithm: algorithm.to_string(),
        content_hash: hash,
        signature,
        timestamp: Utc::now().to_rfc3339(),
        key_id,
    })
}

/// First 16 hex chars of a SHA-256 over key material.
fn key_fingerprint(material: &[u8]) -> String {
    hex::encode(Sha256::digest(material))[..16].to_string()
}

fn write_secret_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);
    use std::io::Write;
    let mut f = opts
        .open(path)
        .with_context(|| format!("writing {}", path.display()))?;
    f.write_all(bytes)?;
    Ok(())
}

#[cfg(feature = "ed25519")]
mod signer {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
    use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
    use ed25519_dalek::{Signer as _, SigningKey};

    fn load_or_create_key(keys_dir: &Path) -> Result<SigningKey> {
        let key_path = keys_dir.join("scan_signing.key");
        if key_path.exists() {
            let pem = fs::read_to_string(&key_path)
                .with_context(|| format!("reading {}", key_path.display()))?;
            return SigningKey::from_pkcs8_pem(&pem).context("parsing signing key");
        }

        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .context("encoding signing key")?;
        write_secret_file(&key_path, pem.as_bytes())?;

        let pub_pem = key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .context("encoding public key")?;
        fs::write(keys_dir.join("scan_signing.pub"), pub_pem)?;
        Ok(key)
    }

    pub fn sign_content(keys_dir: &Path, content: &[u8]) -> Result<(&'static str, String, String)> {
        let key = load_or_create_key(keys_dir)?;
        let signature = key.sign(content);
        let key_id = key_fingerprint(key.verifying_key().as_bytes());
        Ok(("Ed25519", BASE64.encode(signature.to_bytes()), key_id))
    }

    #[cfg(test)]
    pub fn verify(keys_dir: &Path, content: &[u8], signature_b64: &str) -> bool {
        use ed25519_dalek::{Signature, Verifier as _};
        let Ok(key) = load_or_create_key(keys_dir) else {
            return false;
        };
        let Ok(raw) = BASE64.decode(signature_b64) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&raw) else {
            return false;
        };
        key.verifying_key().verify(content, &sig).is_ok()
    }
}

#[cfg(not(feature = "ed25519"))]
mod signer {
    use super::*;
    use hmac::{Hmac, Mac};
    use rand::RngCore;

    type HmacSha256 = Hmac<Sha256>;

    fn load_or_create_secret(keys_dir: &Path) -> Result<Vec<u8>> {
        let secret_path = keys_dir.join("hmac_secret.key");
        if secret_path.exists() {
            return fs::read(&secret_path)
                .with_context(|| format!("reading {}", secret_path.display()));
        }
        let mut secret = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        write_secret_file(&secret_path, &secret)?;
        Ok(secret)
    }

    pub fn sign_content(keys_dir: &Path, content: &[u8]) -> Result<(&'static str, String, String)> {
        let secret = load_or_create_secret(keys_dir)?;
        let mut mac = HmacSha256::new_from_slice(&secret).context("initializing HMAC")?;
        mac.update(content);
        let tag = mac.finalize().into_bytes();
        Ok(("HMAC-SHA256", hex::encode(tag), key_fingerprint(&secret)))
    }
}

use signer::sign_content;
