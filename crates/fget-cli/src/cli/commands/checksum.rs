//! `fget checksum <path>` – compute and print a file digest.

use std::path::Path;

use anyhow::Result;
use fget_core::checksum::{self, Algorithm};

pub fn run_checksum(path: &Path, algorithm: &str) -> Result<()> {
    let algo = match algorithm.to_ascii_lowercase().as_str() {
        "md5" => Algorithm::Md5,
        "sha256" => Algorithm::Sha256,
        other => anyhow::bail!("unknown algorithm: {other} (expected md5 or sha256)"),
    };
    let digest = checksum::digest_path(path, algo)?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
