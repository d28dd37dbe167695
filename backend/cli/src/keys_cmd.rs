//! Operator tooling: master key generation and instruction signing.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tether_core::Claims;
use tether_security::{KeyPairPem, SigningKey, TokenCodec, TrustedKey, KEY_BITS};

const PRIVATE_FILE: &str = "master.pem";
const PUBLIC_FILE: &str = "master.pub.pem";

/// Write a fresh master key pair into `out`. Returns the written paths.
pub async fn keygen(out: &Path, force: bool) -> Result<Vec<PathBuf>> {
    let private_path = out.join(PRIVATE_FILE);
    let public_path = out.join(PUBLIC_FILE);
    if !force {
        for path in [&private_path, &public_path] {
            if path.exists() {
                bail!("{} already exists (use --force to replace it)", path.display());
            }
        }
    }

    let pair = tokio::task::spawn_blocking(|| KeyPairPem::generate(KEY_BITS))
        .await
        .context("key generation task failed")??;

    write_key_files(out, &pair)?;
    Ok(vec![private_path, public_path])
}

fn write_key_files(out: &Path, pair: &KeyPairPem) -> Result<()> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("cannot create {}", out.display()))?;

    let private_path = out.join(PRIVATE_FILE);
    std::fs::write(&private_path, &pair.private_pem)
        .with_context(|| format!("cannot write {}", private_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&private_path, std::fs::Permissions::from_mode(0o600))?;
    }

    let public_path = out.join(PUBLIC_FILE);
    std::fs::write(&public_path, &pair.public_pem)
        .with_context(|| format!("cannot write {}", public_path.display()))?;
    Ok(())
}

/// Sign JSON `claims` with the private key at `key_path`.
pub fn sign(key_path: &Path, claims: &str) -> Result<String> {
    let pem = std::fs::read(key_path)
        .with_context(|| format!("cannot read {}", key_path.display()))?;
    let key = SigningKey::from_rsa_pem(&pem).context("not an RSA private key")?;
    let claims: Claims = serde_json::from_str(claims).context("claims are not valid JSON")?;
    Ok(TokenCodec::sign(&claims, &key)?)
}

/// Verify `token` against the public key at `key_path` and render its
/// payload: pretty JSON for instruction claims, the bare text for replies.
pub fn verify(key_path: &Path, token: &str) -> Result<String> {
    let pem = std::fs::read_to_string(key_path)
        .with_context(|| format!("cannot read {}", key_path.display()))?;
    let trusted = TrustedKey::from_pem(&pem)?;
    let payload = TokenCodec::verify_payload(token, &trusted)?;
    match serde_json::from_slice::<Claims>(&payload) {
        Ok(claims) => Ok(serde_json::to_string_pretty(&claims)?),
        Err(_) => String::from_utf8(payload).context("payload is neither JSON nor UTF-8 text"),
    }
}
