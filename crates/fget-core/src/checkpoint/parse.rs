//! Tolerant loader for the checkpoint text sidecar format.

use std::collections::HashMap;
use std::path::Path;

use super::{Checkpoint, SegmentRecord, MAX_SEGMENTS, MIN_SEGMENTS};

/// Loads a checkpoint from `path`. Any parse failure, missing required key,
/// or out-of-range segment count is treated as "no checkpoint" (`Ok(None)`);
/// only an I/O error reading the file itself (other than not-found) is surfaced.
pub fn load_checkpoint(path: &Path) -> std::io::Result<Option<Checkpoint>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(parse_checkpoint_text(&text))
}

fn parse_checkpoint_text(text: &str) -> Option<Checkpoint> {
    let mut lines = text.lines();
    if lines.next()?.trim() != "[DLMETA]" {
        return None;
    }

    let mut kv: HashMap<String, String> = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=')?;
        kv.insert(key.to_string(), value.to_string());
    }

    let url = kv.get("url")?.clone();
    let filename = kv.get("filename")?.clone();
    let savepath = kv.get("savepath")?.clone();
    let total_size: u64 = kv.get("totalsize")?.parse().ok()?;
    let thread_count: u32 = kv.get("threadcount")?.parse().ok()?;
    let segment_count: u32 = kv.get("segments")?.parse().ok()?;
    let expected_md5 = kv.get("expectedmd5").cloned().unwrap_or_default();
    let etag = kv.get("etag").cloned();
    let last_modified = kv.get("lastmodified").cloned();

    if segment_count < MIN_SEGMENTS || segment_count > MAX_SEGMENTS {
        return None;
    }

    let mut segments = Vec::with_capacity(segment_count as usize);
    for i in 0..segment_count {
        let start: u64 = kv.get(&format!("seg{}_start", i))?.parse().ok()?;
        let end: u64 = kv.get(&format!("seg{}_end", i))?.parse().ok()?;
        let downloaded: u64 = kv.get(&format!("seg{}_downloaded", i))?.parse().ok()?;
        if start > end || downloaded > end - start + 1 {
            return None;
        }
        segments.push(SegmentRecord {
            start,
            end,
            downloaded,
        });
    }

    Some(Checkpoint {
        url,
        filename,
        savepath,
        total_size,
        thread_count,
        expected_md5,
        etag,
        last_modified,
        segments,
    })
}
