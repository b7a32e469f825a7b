//! Single-stream download path: used when the server reports no usable
//! size (`Content-Length` absent or 0) or doesn't support ranges at all.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use curl::easy::Easy;

use crate::error::EngineError;
use crate::host_policy::ConnectionBudget;
use crate::ratelimiter::RateLimiter;
use crate::storage::{self, PartWriter};
use crate::task::Task;
use crate::transport::TransportOptions;

/// Downloads the whole body into segment 0's part file (no `Range` header).
/// The caller merges this single part file into the destination afterward,
/// same as the multi-segment path with one segment.
///
/// Returns `Ok(true)` on completion, `Ok(false)` if the task was paused
/// mid-transfer (not a failure), or `Err` on cancellation or a real error.
pub fn run_single_stream(
    task: &Arc<Task>,
    transport: &TransportOptions,
    rate_limiter: &RateLimiter,
    connection_budget: &ConnectionBudget,
) -> Result<bool, EngineError> {
    let _guard = connection_budget.reserve_blocking();
    let part_path = storage::part_path(&task.save_path, 0);
    let mut writer =
        PartWriter::open(&part_path, 0).map_err(|e| EngineError::FileIo(e.to_string()))?;

    let mut easy = Easy::new();
    easy.url(&task.url)
        .map_err(|e| EngineError::InvalidUrl(e.to_string()))?;
    let _ = easy.follow_location(true);
    transport
        .apply(&mut easy)
        .map_err(|e| EngineError::ConnectFailed(e.to_string()))?;

    let mut downloaded = 0u64;
    let mut cancelled = false;
    let mut paused = false;
    let mut write_err = None;

    {
        let mut transfer = easy.transfer();
        let result = transfer.write_function(|data| {
            if task.is_cancelled() {
                cancelled = true;
                return 0;
            }
            if task.is_paused() {
                paused = true;
                return 0;
            }
            if writer.write_chunk(data).is_err() {
                return 0;
            }
            downloaded += data.len() as u64;
            task.downloaded_size.fetch_add(data.len() as u64, Ordering::SeqCst);
            rate_limiter.consume(data.len() as u64);
            data.len()
        });

        if let Err(e) = result {
            write_err = Some(e);
        } else if let Err(e) = transfer.perform() {
            write_err = Some(e);
        }
    }

    if cancelled {
        return Err(EngineError::Cancelled);
    }

    {
        let segments = task.segments.lock().expect("segments mutex poisoned");
        if let Some(seg) = segments.first() {
            seg.downloaded.store(downloaded, Ordering::SeqCst);
        }
    }

    if paused {
        writer.sync().map_err(|e| EngineError::FileIo(e.to_string()))?;
        task.total_size.store(downloaded, Ordering::SeqCst);
        return Ok(false);
    }
    if let Some(e) = write_err {
        return Err(EngineError::from(e));
    }

    writer.sync().map_err(|e| EngineError::FileIo(e.to_string()))?;
    task.total_size.store(downloaded, Ordering::SeqCst);

    {
        let segments = task.segments.lock().expect("segments mutex poisoned");
        if let Some(seg) = segments.first() {
            seg.completed.store(true, Ordering::SeqCst);
        }
    }

    Ok(true)
}
