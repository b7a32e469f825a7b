//! Concatenates segment part files into the final destination.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::temp_path;

/// Concatenates `part_paths` (already in segment order) into `destination`.
///
/// Writes to a temp file first and renames atomically into place, then
/// removes the part files. If any step fails, the part files are left
/// untouched so a later retry can resume the merge.
pub fn merge_parts(destination: &Path, part_paths: &[PathBuf]) -> Result<()> {
    let tmp = temp_path(destination);
    {
        let mut out = File::create(&tmp)
            .with_context(|| format!("failed to create merge temp file: {}", tmp.display()))?;
        for part in part_paths {
            let mut f = File::open(part)
                .with_context(|| format!("failed to open part file: {}", part.display()))?;
            io::copy(&mut f, &mut out)
                .with_context(|| format!("failed to copy part file: {}", part.display()))?;
        }
        out.sync_all().context("failed to sync merged file")?;
    }

    std::fs::rename(&tmp, destination).with_context(|| {
        format!(
            "failed to rename merged file {} to {}",
            tmp.display(),
            destination.display()
        )
    })?;

    for part in part_paths {
        let _ = std::fs::remove_file(part);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_in_order_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let p0 = dir.path().join("out.bin.part0");
        let p1 = dir.path().join("out.bin.part1");
        let p2 = dir.path().join("out.bin.part2");
        std::fs::write(&p0, b"hello ").unwrap();
        std::fs::write(&p1, b"cruel ").unwrap();
        std::fs::write(&p2, b"world").unwrap();

        merge_parts(&dest, &[p0.clone(), p1.clone(), p2.clone()]).unwrap();

        let merged = std::fs::read(&dest).unwrap();
        assert_eq!(merged, b"hello cruel world");
        assert!(!p0.exists());
        assert!(!p1.exists());
        assert!(!p2.exists());
    }

    #[test]
    fn single_part_merge() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let p0 = dir.path().join("out.bin.part0");
        std::fs::write(&p0, b"solo").unwrap();

        merge_parts(&dest, &[p0.clone()]).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"solo");
        assert!(!p0.exists());
    }
}
