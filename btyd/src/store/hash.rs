use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use super::Hosts;

/// Computes a SHA-256 digest of the host store.
/// `Hosts` iterates in hwa order, so the digest does not depend on the order
/// records were created or how the file on disk happened to be formatted.
pub fn compute_digest(hosts: &Hosts) -> Result<String> {
    let json = serde_json::to_vec(hosts).context("Failed to serialize hosts for hashing")?;
    let hash = Sha256::digest(&json);
    Ok(hex::encode(hash))
}
