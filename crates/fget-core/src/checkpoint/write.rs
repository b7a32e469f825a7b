//! Serializes a checkpoint to its text sidecar format.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use super::Checkpoint;

/// Writes `checkpoint` to `path`, overwriting any existing file.
///
/// Not transactional: a crash mid-write can leave a truncated or stale file,
/// which the loader will reject as corrupt and discard.
pub fn save_checkpoint(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    let mut out = String::new();
    out.push_str("[DLMETA]\n");
    out.push_str(&format!("url={}\n", checkpoint.url));
    out.push_str(&format!("filename={}\n", checkpoint.filename));
    out.push_str(&format!("savepath={}\n", checkpoint.savepath));
    out.push_str(&format!("totalsize={}\n", checkpoint.total_size));
    out.push_str(&format!("threadcount={}\n", checkpoint.thread_count));
    out.push_str(&format!("segments={}\n", checkpoint.segments.len()));
    out.push_str(&format!("expectedmd5={}\n", checkpoint.expected_md5));
    if let Some(etag) = &checkpoint.etag {
        out.push_str(&format!("etag={}\n", etag));
    }
    if let Some(lm) = &checkpoint.last_modified {
        out.push_str(&format!("lastmodified={}\n", lm));
    }
    for (i, seg) in checkpoint.segments.iter().enumerate() {
        out.push_str(&format!("seg{}_start={}\n", i, seg.start));
        out.push_str(&format!("seg{}_end={}\n", i, seg.end));
        out.push_str(&format!("seg{}_downloaded={}\n", i, seg.downloaded));
    }

    let mut f = std::fs::File::create(path)
        .with_context(|| format!("failed to create checkpoint file: {}", path.display()))?;
    f.write_all(out.as_bytes())
        .with_context(|| format!("failed to write checkpoint file: {}", path.display()))?;
    Ok(())
}
