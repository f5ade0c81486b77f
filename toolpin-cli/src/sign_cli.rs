//! Publisher side: detached signatures for plugin and tool artifacts

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::Args;
use ed25519_dalek::SigningKey;
use std::path::{Path, PathBuf};
use tracing::info;

use toolpin_core::trust::signature::fingerprint;
use toolpin_core::trust::DetachedSignature;

#[derive(Args, Debug)]
pub struct SignArgs {
    /// File holding the base64 encoded 32 byte ed25519 secret key
    #[clap(long)]
    key: PathBuf,

    /// Artifact to sign
    artifact: PathBuf,

    /// Where to write the signature (defaults to <artifact>.sig)
    #[clap(long)]
    output: Option<PathBuf>,
}

pub fn run_sign(args: &SignArgs) -> Result<()> {
    let key = read_signing_key(&args.key)?;
    let artifact = std::fs::read(&args.artifact)
        .with_context(|| format!("Failed to read artifact: {}", args.artifact.display()))?;

    let signature = DetachedSignature::create(&key, &artifact);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| signature_path(&args.artifact));

    std::fs::write(&output, signature.to_bytes()?)
        .with_context(|| format!("Failed to write signature: {}", output.display()))?;

    let key_fingerprint = fingerprint(&key.verifying_key());
    info!("Signed {} with key {}", args.artifact.display(), key_fingerprint);

    println!("Signature written to {}", output.display());
    println!("Public key: {}", signature.public_key);
    println!("Fingerprint: {key_fingerprint}");
    Ok(())
}

fn read_signing_key(path: &Path) -> Result<SigningKey> {
    let encoded = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;
    let raw = BASE64
        .decode(encoded.trim())
        .context("Key file is not valid base64")?;
    let seed: [u8; 32] = raw
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("Expected a 32 byte secret key, got {} bytes", raw.len()))?;
    Ok(SigningKey::from_bytes(&seed))
}

fn signature_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}
