//! Segment worker (C5): downloads one byte range into its own part file.

use std::cell::Cell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use curl::easy::Easy;

use crate::error::EngineError;
use crate::ratelimiter::RateLimiter;
use crate::storage::{self, PartWriter};
use crate::task::Task;
use crate::transport::TransportOptions;

/// Outcome of one segment worker attempt.
pub struct SegmentOutcome {
    pub completed: bool,
    /// Set when the worker stopped because the task was paused, not
    /// cancelled or failed. No `error` is set in this case; the segment's
    /// `downloaded` counter (and the checkpoint built from it) already
    /// reflects how far it got, ready for a later resume.
    pub paused: bool,
    pub error: Option<EngineError>,
}

/// Runs segment `index` of `task` to completion, to a cancel/pause
/// observation, or to failure. Safe to call again to resume: the caller is
/// responsible for re-dispatching a segment that didn't complete.
pub fn run_segment(
    task: &Arc<Task>,
    index: usize,
    transport: &TransportOptions,
    rate_limiter: &RateLimiter,
) -> SegmentOutcome {
    let (range, downloaded_at_start, part_path) = {
        let segments = task.segments.lock().expect("segments mutex poisoned");
        let seg = &segments[index];
        (
            seg.range,
            seg.downloaded.load(Ordering::SeqCst),
            storage::part_path(&task.save_path, index),
        )
    };

    if downloaded_at_start >= range.len() {
        mark_completed(task, index);
        return SegmentOutcome {
            completed: true,
            paused: false,
            error: None,
        };
    }

    let mut writer = match PartWriter::open(&part_path, downloaded_at_start) {
        Ok(w) => w,
        Err(e) => {
            let err = EngineError::FileIo(e.to_string());
            record_error(task, index, &err);
            return SegmentOutcome {
                completed: false,
                paused: false,
                error: Some(err),
            };
        }
    };

    // The part file on disk may be longer than `downloaded_at_start`: the
    // checkpoint this value comes from is persisted on a 1s cadence, so a
    // crash can leave bytes on disk past the last persisted offset. Drop
    // that stale tail before resuming in append mode, or the resumed bytes
    // land after it instead of overwriting it.
    if let Err(e) = writer.truncate_to(downloaded_at_start) {
        let err = EngineError::FileIo(e.to_string());
        record_error(task, index, &err);
        return SegmentOutcome {
            completed: false,
            paused: false,
            error: Some(err),
        };
    }

    let mut easy = Easy::new();
    if let Err(e) = easy.url(&task.url) {
        let err = EngineError::InvalidUrl(e.to_string());
        record_error(task, index, &err);
        return SegmentOutcome {
            completed: false,
            paused: false,
            error: Some(err),
        };
    }
    let _ = easy.follow_location(true);
    if let Err(e) = transport.apply(&mut easy) {
        let err = EngineError::ConnectFailed(e.to_string());
        record_error(task, index, &err);
        return SegmentOutcome {
            completed: false,
            paused: false,
            error: Some(err),
        };
    }

    let resume_start = range.start.saturating_add(downloaded_at_start).min(range.end);
    let raw_range = format!("{}-{}", resume_start, range.end);
    if let Err(e) = easy.range(&raw_range) {
        let err = EngineError::ConnectFailed(e.to_string());
        record_error(task, index, &err);
        return SegmentOutcome {
            completed: false,
            paused: false,
            error: Some(err),
        };
    }

    let status_code: Cell<u16> = Cell::new(0);
    let mut segment_downloaded = downloaded_at_start;
    let mut write_err: Option<EngineError> = None;
    let cancelled = Cell::new(false);
    let paused = Cell::new(false);
    let mismatched_range = Cell::new(false);

    {
        let mut transfer = easy.transfer();

        transfer
            .header_function(|data| {
                if let Ok(line) = std::str::from_utf8(data) {
                    if let Some(code) = parse_status_line(line) {
                        status_code.set(code);
                    }
                }
                true
            })
            .ok();

        let write_result = transfer.write_function(|data| {
            if task.is_cancelled() {
                cancelled.set(true);
                return 0;
            }
            if task.is_paused() {
                paused.set(true);
                return 0;
            }

            // Headers arrive before the body, so by the first body chunk the
            // status line is already parsed: catch a server that ignored our
            // Range request here, before any of its (wrong-offset) bytes are
            // written to the part file or counted toward `downloaded`.
            let code = status_code.get();
            if code == 200 && !(index == 0 && segment_downloaded == 0) {
                mismatched_range.set(true);
                return 0;
            }

            let remaining = range.len() - segment_downloaded;
            let to_write = (data.len() as u64).min(remaining) as usize;

            if to_write == 0 {
                return data.len();
            }

            if writer.write_chunk(&data[..to_write]).is_err() {
                return 0;
            }

            segment_downloaded += to_write as u64;
            task.downloaded_size.fetch_add(to_write as u64, Ordering::SeqCst);
            {
                let segments = task.segments.lock().expect("segments mutex poisoned");
                segments[index]
                    .downloaded
                    .store(segment_downloaded, Ordering::SeqCst);
            }
            rate_limiter.consume(to_write as u64);

            data.len()
        });

        if let Err(e) = write_result {
            write_err = Some(EngineError::from(e));
        } else if let Err(e) = transfer.perform() {
            write_err = Some(EngineError::from(e));
        }
    }

    if cancelled.get() {
        let err = EngineError::Cancelled;
        record_error(task, index, &err);
        return SegmentOutcome {
            completed: false,
            paused: false,
            error: Some(err),
        };
    }

    if paused.get() {
        // A pause is not a failure: leave `error` empty and the status
        // machine untouched. `segment_downloaded` is already persisted to
        // the segment's atomic counter from inside the write callback, so
        // the next resume picks up from here.
        if let Err(e) = writer.sync() {
            let err = EngineError::FileIo(e.to_string());
            record_error(task, index, &err);
            return SegmentOutcome {
                completed: false,
                paused: false,
                error: Some(err),
            };
        }
        return SegmentOutcome {
            completed: false,
            paused: true,
            error: None,
        };
    }

    if mismatched_range.get() {
        let err = EngineError::TruncatedResponse(
            "server ignored range request (200 on ranged GET)".to_string(),
        );
        record_error(task, index, &err);
        return SegmentOutcome {
            completed: false,
            paused: false,
            error: Some(err),
        };
    }

    if let Some(err) = write_err {
        record_error(task, index, &err);
        return SegmentOutcome {
            completed: false,
            paused: false,
            error: Some(err),
        };
    }

    let code = status_code.get();
    if code != 0 && code != 206 && code != 200 {
        let err = EngineError::HttpStatus(code);
        record_error(task, index, &err);
        return SegmentOutcome {
            completed: false,
            paused: false,
            error: Some(err),
        };
    }

    // Server ignored our Range request: a 200 body is only safe to accept
    // for the first segment, starting fresh; any other segment, or a resumed
    // (downloaded > 0) first segment, got the wrong bytes and must fail.
    if code == 200 {
        let acceptable = index == 0 && downloaded_at_start == 0;
        if !acceptable {
            let err = EngineError::TruncatedResponse(
                "server ignored range request (200 on ranged GET)".to_string(),
            );
            record_error(task, index, &err);
            return SegmentOutcome {
                completed: false,
                paused: false,
                error: Some(err),
            };
        }
    }

    if let Err(e) = writer.sync() {
        let err = EngineError::FileIo(e.to_string());
        record_error(task, index, &err);
        return SegmentOutcome {
            completed: false,
            paused: false,
            error: Some(err),
        };
    }

    let completed = segment_downloaded >= range.len();
    if completed {
        mark_completed(task, index);
    }

    SegmentOutcome {
        completed,
        paused: false,
        error: None,
    }
}

fn mark_completed(task: &Task, index: usize) {
    let segments = task.segments.lock().expect("segments mutex poisoned");
    segments[index].completed.store(true, Ordering::SeqCst);
}

fn record_error(task: &Task, index: usize, error: &EngineError) {
    let segments = task.segments.lock().expect("segments mutex poisoned");
    *segments[index].last_error.lock().expect("segment error mutex poisoned") = Some(error.detail());
}

fn parse_status_line(line: &str) -> Option<u16> {
    let line = line.trim();
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_line() {
        assert_eq!(parse_status_line("HTTP/1.1 206 Partial Content"), Some(206));
        assert_eq!(parse_status_line("HTTP/1.1 200 OK"), Some(200));
        assert_eq!(parse_status_line("Content-Length: 5"), None);
    }
}
