//! Task controller (C6): per-task state machine execution.
//!
//! Probes file info, plans segments (or falls back to a single stream),
//! spawns segment workers, aggregates progress, merges part files, verifies,
//! and decides between retry and terminal failure.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::callbacks::Callbacks;
use crate::checkpoint::{self, Checkpoint, SegmentRecord};
use crate::checksum::{self, Algorithm};
use crate::config::EngineConfig;
use crate::downloader;
use crate::error::EngineError;
use crate::fetch_head;
use crate::host_policy::{ConnectionBudget, HostKey, HostPolicy};
use crate::ratelimiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::segmenter::{self, Segment};
use crate::storage;
use crate::task::{SegmentState, Task, TaskStatus};
use crate::transport::TransportOptions;
use crate::url_model;

/// How often the supervisor loop aggregates progress and fires the
/// throttled progress callback.
const PROGRESS_TICK: Duration = Duration::from_millis(100);
/// Progress callbacks are throttled to at most this frequency.
const PROGRESS_CALLBACK_INTERVAL: Duration = Duration::from_millis(200);
/// How often the supervisor persists the checkpoint during a multi-segment download.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(1);

/// What the scheduler should do with the task after `execute_task` returns.
pub enum TaskOutcome {
    Completed,
    Cancelled,
    /// The task was paused mid-download. Status is already `Paused` (set
    /// synchronously by `pause_task`); the scheduler just stops driving it
    /// until a matching `resume_task` re-queues it.
    Paused,
    Retry,
    Failed,
}

/// Runs one full attempt of `task` and returns what the scheduler should do
/// next. Never panics on expectable failure paths; every error becomes a
/// retry-or-fail decision via `retry_policy`.
pub fn execute_task(
    task: &Arc<Task>,
    config: &EngineConfig,
    host_policy: &Arc<HostPolicy>,
    connection_budget: &Arc<ConnectionBudget>,
    rate_limiter: &Arc<RateLimiter>,
    callbacks: &Arc<Callbacks>,
    retry_policy: &RetryPolicy,
) -> TaskOutcome {
    task.set_status(TaskStatus::Downloading);
    callbacks.status(&task.id, TaskStatus::Downloading);

    let transport = TransportOptions {
        proxy: config.proxy.clone(),
        verify_ssl: config.verify_ssl,
        connect_timeout: Duration::from_millis(config.connect_timeout_ms as u64),
        read_timeout: Duration::from_millis(config.read_timeout_ms as u64),
    };

    let host_key = HostKey::from_url(&task.url);

    let head = match fetch_head::probe(&task.url, &Default::default(), &transport) {
        Ok(h) => h,
        Err(e) => {
            let err = EngineError::ConnectFailed(e.to_string());
            return fail_or_retry(task, callbacks, retry_policy, err);
        }
    };

    if let Some(key) = &host_key {
        host_policy.record_head_result(key, head.accept_ranges, config.clamped_default_thread_count());
    }

    let file_name = url_model::derive_filename(&task.url, head.content_disposition.as_deref());
    *task.file_name.lock().expect("file_name mutex poisoned") = file_name;
    *task.etag.lock().expect("etag mutex poisoned") = head.etag.clone();
    *task.last_modified.lock().expect("last_modified mutex poisoned") = head.last_modified.clone();

    let destination = task.save_path.clone();
    if let Some(parent) = destination.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            let err = EngineError::FileIo(e.to_string());
            return fail_or_retry(task, callbacks, retry_policy, err);
        }
    }

    let total_size = head.content_length.unwrap_or(0);
    task.total_size.store(total_size, Ordering::SeqCst);

    let use_single_stream = total_size == 0 || !head.accept_ranges;

    if use_single_stream {
        {
            let mut segments = task.segments.lock().expect("segments mutex poisoned");
            *segments = vec![SegmentState::new(Segment { start: 0, end: 0 }, 0)];
        }
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let progress_handle = spawn_progress_loop(task, callbacks, done.clone(), &destination, None);
        let result = downloader::run_single_stream(task, &transport, rate_limiter, connection_budget);
        done.store(true, Ordering::SeqCst);
        let _ = progress_handle.join();

        match result {
            Ok(true) => {}
            Ok(false) => return TaskOutcome::Paused,
            Err(e) if e.is_cancelled() => return cancel(task, callbacks),
            Err(e) => return fail_or_retry(task, callbacks, retry_policy, e),
        }

        let part_path = storage::part_path(&destination, 0);
        if let Err(e) = storage::merge_parts(&destination, &[part_path]) {
            let err = EngineError::FileIo(e.to_string());
            return fail_or_retry(task, callbacks, retry_policy, err);
        }
    } else {
        let checkpoint_path = checkpoint::checkpoint_path(&destination);
        let restored = load_matching_checkpoint(&checkpoint_path, task, &head);

        let segments = if let Some(cp) = restored {
            cp.segments
                .into_iter()
                .map(|s| SegmentState::new(Segment { start: s.start, end: s.end }, s.downloaded))
                .collect()
        } else {
            let count = if task.thread_count_pinned {
                task.thread_count.clamp(1, 16)
            } else {
                host_policy
                    .recommended_thread_count_for_url(&task.url, task.thread_count)
                    .clamp(1, 16)
            } as usize;
            segmenter::plan_segments(total_size, count.max(1))
                .into_iter()
                .map(|s| SegmentState::new(s, 0))
                .collect()
        };

        {
            let mut task_segments = task.segments.lock().expect("segments mutex poisoned");
            *task_segments = segments;
        }

        let already_downloaded: u64 = {
            let segments = task.segments.lock().expect("segments mutex poisoned");
            segments.iter().map(|s| s.downloaded.load(Ordering::SeqCst)).sum()
        };
        task.downloaded_size.store(already_downloaded, Ordering::SeqCst);

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let progress_handle = spawn_progress_loop(task, callbacks, done.clone(), &destination, Some(&head));
        let transfer_started = Instant::now();
        let outcomes =
            downloader::run_segments_concurrently(task, &transport, rate_limiter, connection_budget);
        done.store(true, Ordering::SeqCst);
        let _ = progress_handle.join();

        if task.is_cancelled() {
            return cancel(task, callbacks);
        }

        if task.is_paused() {
            persist_checkpoint(task, &head, &checkpoint_path);
            return TaskOutcome::Paused;
        }

        if let Some((_, outcome)) = outcomes.iter().find(|(_, o)| !o.completed && !o.paused) {
            let err = outcome
                .error
                .clone()
                .unwrap_or_else(|| EngineError::TruncatedResponse("segment did not complete".into()));
            persist_checkpoint(task, &head, &checkpoint_path);
            return fail_or_retry(task, callbacks, retry_policy, err);
        }

        let part_paths: Vec<PathBuf> = {
            let segments = task.segments.lock().expect("segments mutex poisoned");
            (0..segments.len())
                .map(|i| storage::part_path(&destination, i))
                .collect()
        };

        if let Err(e) = storage::merge_parts(&destination, &part_paths) {
            let err = EngineError::FileIo(e.to_string());
            persist_checkpoint(task, &head, &checkpoint_path);
            return fail_or_retry(task, callbacks, retry_policy, err);
        }

        if let Some(key) = &host_key {
            let elapsed = transfer_started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let rate = total_size as f64 / elapsed;
                host_policy.record_job_outcome(key, rate, config.clamped_default_thread_count());
            }
        }

        let _ = std::fs::remove_file(&checkpoint_path);
    }

    if let Some(expected) = &task.expected_md5 {
        if config.verify_checksum && !expected.is_empty() {
            let ok = checksum::verify(&destination, expected, Algorithm::Md5);
            task.verified.store(ok, Ordering::SeqCst);
            if !ok {
                let err = EngineError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: checksum::md5_path(&destination).unwrap_or_default(),
                };
                return fail_or_retry(task, callbacks, retry_policy, err);
            }
        }
    }

    task.set_status(TaskStatus::Completed);
    callbacks.complete(&task.id, &destination.to_string_lossy());
    callbacks.status(&task.id, TaskStatus::Completed);
    TaskOutcome::Completed
}

fn cancel(task: &Task, callbacks: &Callbacks) -> TaskOutcome {
    task.set_status(TaskStatus::Cancelled);
    callbacks.status(&task.id, TaskStatus::Cancelled);
    TaskOutcome::Cancelled
}

fn fail_or_retry(
    task: &Task,
    callbacks: &Callbacks,
    retry_policy: &RetryPolicy,
    error: EngineError,
) -> TaskOutcome {
    if error.is_cancelled() {
        return cancel(task, callbacks);
    }

    let retry_count = task.retry_count.load(Ordering::SeqCst);
    *task.error_message.lock().expect("error_message mutex poisoned") = Some(error.detail());

    if retry_policy.should_retry(retry_count, &error) {
        task.retry_count.fetch_add(1, Ordering::SeqCst);
        callbacks.error(&task.id, &error.detail(), true);
        thread::sleep(retry_policy.delay());
        task.set_status(TaskStatus::Pending);
        callbacks.status(&task.id, TaskStatus::Pending);
        TaskOutcome::Retry
    } else {
        callbacks.error(&task.id, &error.detail(), false);
        task.set_status(TaskStatus::Error);
        callbacks.status(&task.id, TaskStatus::Error);
        TaskOutcome::Failed
    }
}

fn load_matching_checkpoint(
    path: &std::path::Path,
    task: &Task,
    head: &fetch_head::HeadResult,
) -> Option<Checkpoint> {
    let cp = checkpoint::load_checkpoint(path).ok().flatten()?;

    if cp.url != task.url {
        return None;
    }
    if cp.total_size != head.content_length.unwrap_or(0) {
        return None;
    }
    if let (Some(etag), Some(cp_etag)) = (&head.etag, &cp.etag) {
        if etag != cp_etag {
            return None;
        }
    }
    if let (Some(lm), Some(cp_lm)) = (&head.last_modified, &cp.last_modified) {
        if lm != cp_lm {
            return None;
        }
    }

    Some(cp)
}

fn persist_checkpoint(task: &Task, head: &fetch_head::HeadResult, path: &std::path::Path) {
    let segments = task.segments.lock().expect("segments mutex poisoned");
    if segments.is_empty() {
        return;
    }
    let records: Vec<SegmentRecord> = segments
        .iter()
        .map(|s| SegmentRecord {
            start: s.range.start,
            end: s.range.end,
            downloaded: s.downloaded.load(Ordering::SeqCst),
        })
        .collect();
    drop(segments);

    let cp = Checkpoint {
        url: task.url.clone(),
        filename: task.file_name.lock().expect("file_name mutex poisoned").clone(),
        savepath: task.save_path.to_string_lossy().into_owned(),
        total_size: task.total_size.load(Ordering::SeqCst),
        thread_count: task.thread_count,
        expected_md5: task.expected_md5.clone().unwrap_or_default(),
        etag: head.etag.clone(),
        last_modified: head.last_modified.clone(),
        segments: records,
    };

    let _ = checkpoint::save_checkpoint(path, &cp);
}

fn spawn_progress_loop(
    task: &Arc<Task>,
    callbacks: &Arc<Callbacks>,
    done: Arc<std::sync::atomic::AtomicBool>,
    destination: &std::path::Path,
    head_for_checkpoint: Option<&fetch_head::HeadResult>,
) -> thread::JoinHandle<()> {
    let task = Arc::clone(task);
    let callbacks = Arc::clone(callbacks);
    let destination = destination.to_path_buf();
    let checkpoint_path = checkpoint::checkpoint_path(&destination);
    let head_snapshot = head_for_checkpoint.cloned();

    thread::spawn(move || {
        let start = Instant::now();
        let mut last_callback = Instant::now() - PROGRESS_CALLBACK_INTERVAL;
        let mut last_checkpoint = Instant::now();
        let mut last_sample = (Instant::now(), task.downloaded_size.load(Ordering::SeqCst));

        while !done.load(Ordering::SeqCst) {
            thread::sleep(PROGRESS_TICK);
            let now = Instant::now();
            let downloaded = task.downloaded_size.load(Ordering::SeqCst);

            let dt = now.duration_since(last_sample.0).as_secs_f64();
            if dt > 0.0 {
                let rate = (downloaded.saturating_sub(last_sample.1)) as f64 / dt;
                *task.bytes_per_second.lock().expect("speed mutex poisoned") = rate;
                last_sample = (now, downloaded);
            }

            if now.duration_since(last_callback) >= PROGRESS_CALLBACK_INTERVAL {
                let total = task.total_size.load(Ordering::SeqCst);
                let speed = *task.bytes_per_second.lock().expect("speed mutex poisoned");
                callbacks.progress(&task.id, task.progress_percent(), downloaded, total, speed);
                last_callback = now;
            }

            if let Some(head) = &head_snapshot {
                if now.duration_since(last_checkpoint) >= CHECKPOINT_INTERVAL {
                    persist_checkpoint(&task, head, &checkpoint_path);
                    last_checkpoint = now;
                }
            }
        }

        let _ = start;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_or_retry_marks_pending_when_retries_remain() {
        let task = Arc::new(Task::new("a".into(), "http://x".into(), "/tmp/a".into(), 1, None));
        let callbacks = Arc::new(Callbacks::new());
        let policy = RetryPolicy::new(3, 0);
        let outcome = fail_or_retry(&task, &callbacks, &policy, EngineError::Timeout("x".into()));
        assert!(matches!(outcome, TaskOutcome::Retry));
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.retry_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fail_or_retry_terminal_when_exhausted() {
        let task = Arc::new(Task::new("a".into(), "http://x".into(), "/tmp/a".into(), 1, None));
        task.retry_count.store(3, Ordering::SeqCst);
        let callbacks = Arc::new(Callbacks::new());
        let policy = RetryPolicy::new(3, 0);
        let outcome = fail_or_retry(&task, &callbacks, &policy, EngineError::Timeout("x".into()));
        assert!(matches!(outcome, TaskOutcome::Failed));
        assert_eq!(task.status(), TaskStatus::Error);
    }

    #[test]
    fn fail_or_retry_cancelled_short_circuits() {
        let task = Arc::new(Task::new("a".into(), "http://x".into(), "/tmp/a".into(), 1, None));
        let callbacks = Arc::new(Callbacks::new());
        let policy = RetryPolicy::new(3, 0);
        let outcome = fail_or_retry(&task, &callbacks, &policy, EngineError::Cancelled);
        assert!(matches!(outcome, TaskOutcome::Cancelled));
        assert_eq!(task.status(), TaskStatus::Cancelled);
    }
}
