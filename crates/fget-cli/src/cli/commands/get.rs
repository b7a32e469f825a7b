//! `fget get <url>...` – download one or more URLs, blocking until every
//! task reaches a terminal status.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use fget_core::task::TaskStatus;
use fget_core::url_model;
use fget_core::{Engine, EngineConfig};

/// Long enough to behave as "block until done" for a CLI invocation without
/// risking `Instant` arithmetic overflow.
const WAIT_FOREVER: Duration = Duration::from_secs(24 * 60 * 60);

pub fn run_get(
    mut cfg: EngineConfig,
    urls: Vec<String>,
    dir: Option<PathBuf>,
    threads: Option<u32>,
    md5: Option<String>,
) -> Result<()> {
    if urls.is_empty() {
        anyhow::bail!("no URLs given");
    }

    let save_dir = dir.unwrap_or_else(|| cfg.default_save_path.clone());
    cfg.default_save_path = save_dir.clone();

    let engine = Engine::new(cfg);
    engine.callbacks().set_status(|id, status| {
        println!("[{id}] {status:?}");
    });
    engine.callbacks().set_error(|id, message, will_retry| {
        if will_retry {
            eprintln!("[{id}] error (retrying): {message}");
        } else {
            eprintln!("[{id}] error: {message}");
        }
    });
    engine.callbacks().set_complete(|id, path| {
        println!("[{id}] saved to {path}");
    });
    engine.callbacks().set_progress(|id, percent, downloaded, total, bytes_per_second| {
        let mib_per_sec = bytes_per_second / 1_048_576.0;
        println!(
            "[{id}] {percent:.1}%  {downloaded}/{total} bytes  {mib_per_sec:.2} MiB/s"
        );
    });

    for url in &urls {
        let file_name = url_model::derive_filename(url, None);
        let save_path = save_dir.join(file_name);
        if let Some(md5) = &md5 {
            engine.add_task_with_md5(url, &save_path, threads, Some(md5.clone()));
        } else {
            engine.add_task(url, &save_path, threads);
        }
    }

    let snapshots = engine.wait_for_all(WAIT_FOREVER);
    engine.shutdown();

    let failed = snapshots.iter().filter(|s| s.status == TaskStatus::Error).count();
    if failed > 0 {
        anyhow::bail!("{} of {} download(s) failed", failed, snapshots.len());
    }

    Ok(())
}
