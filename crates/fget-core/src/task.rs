//! Task data model: state machine status, in-memory task record, and the
//! read-only snapshot handed back by `getTaskInfo`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::segmenter::Segment;

/// Task lifecycle state.
///
/// ```text
/// Pending ──worker picks up──▶ Downloading
/// Downloading ──pause──▶ Paused ──resume──▶ Pending
/// Downloading ──cancel──▶ Cancelled                     (terminal)
/// Downloading ──error, retries left──▶ Pending
/// Downloading ──error, no retries──▶ Error              (terminal)
/// Error ──retry──▶ Pending
/// Downloading ──all segments done + merge OK + verify OK──▶ Completed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Downloading,
    Paused,
    Cancelled,
    Error,
    Completed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Cancelled | TaskStatus::Error | TaskStatus::Completed
        )
    }
}

/// One in-progress or planned segment, with atomically mutated progress
/// counters. Built once during planning; only `downloaded`/`completed`
/// change afterward, so no per-segment lock is needed while downloading.
pub struct SegmentState {
    pub range: Segment,
    pub downloaded: AtomicU64,
    pub completed: AtomicBool,
    pub last_error: Mutex<Option<String>>,
}

impl SegmentState {
    pub fn new(range: Segment, downloaded: u64) -> Self {
        let completed = downloaded == range.len();
        SegmentState {
            range,
            downloaded: AtomicU64::new(downloaded),
            completed: AtomicBool::new(completed),
            last_error: Mutex::new(None),
        }
    }
}

/// A download task. Per-task fields users read concurrently (downloaded,
/// speed, status, progress) are atomics; the task table holding these is a
/// readers-writer-locked map (see `scheduler`).
pub struct Task {
    pub id: String,
    pub url: String,
    pub save_path: std::path::PathBuf,
    pub file_name: Mutex<String>,
    pub expected_md5: Option<String>,
    pub thread_count: u32,
    /// True if the caller passed an explicit thread count to `addTask`. The
    /// host policy's recommended count is only ever used as a *default* —
    /// it never overrides one of these.
    pub thread_count_pinned: bool,

    pub total_size: AtomicU64,
    pub downloaded_size: AtomicU64,
    pub bytes_per_second: Mutex<f64>,
    pub status: Mutex<TaskStatus>,
    pub retry_count: AtomicU32,
    pub verified: AtomicBool,
    pub error_message: Mutex<Option<String>>,

    pub cancel_flag: AtomicBool,
    pub pause_flag: AtomicBool,

    pub segments: Mutex<Vec<SegmentState>>,
    pub etag: Mutex<Option<String>>,
    pub last_modified: Mutex<Option<String>>,
}

impl Task {
    pub fn new(
        id: String,
        url: String,
        save_path: std::path::PathBuf,
        thread_count: u32,
        expected_md5: Option<String>,
    ) -> Self {
        Self::new_with_pin(id, url, save_path, thread_count, true, expected_md5)
    }

    pub fn new_with_pin(
        id: String,
        url: String,
        save_path: std::path::PathBuf,
        thread_count: u32,
        thread_count_pinned: bool,
        expected_md5: Option<String>,
    ) -> Self {
        Task {
            id,
            url,
            save_path,
            file_name: Mutex::new(String::new()),
            expected_md5,
            thread_count: thread_count.clamp(1, 16),
            thread_count_pinned,
            total_size: AtomicU64::new(0),
            downloaded_size: AtomicU64::new(0),
            bytes_per_second: Mutex::new(0.0),
            status: Mutex::new(TaskStatus::Pending),
            retry_count: AtomicU32::new(0),
            verified: AtomicBool::new(false),
            error_message: Mutex::new(None),
            cancel_flag: AtomicBool::new(false),
            pause_flag: AtomicBool::new(false),
            segments: Mutex::new(Vec::new()),
            etag: Mutex::new(None),
            last_modified: Mutex::new(None),
        }
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.lock().expect("task status mutex poisoned")
    }

    pub fn set_status(&self, status: TaskStatus) {
        *self.status.lock().expect("task status mutex poisoned") = status;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.pause_flag.load(Ordering::SeqCst)
    }

    pub fn progress_percent(&self) -> f64 {
        let total = self.total_size.load(Ordering::SeqCst);
        if total == 0 {
            return 0.0;
        }
        let downloaded = self.downloaded_size.load(Ordering::SeqCst);
        (downloaded as f64 / total as f64) * 100.0
    }

    pub fn eta_seconds(&self) -> Option<f64> {
        let total = self.total_size.load(Ordering::SeqCst);
        let downloaded = self.downloaded_size.load(Ordering::SeqCst);
        let speed = *self.bytes_per_second.lock().expect("speed mutex poisoned");
        if speed <= 0.0 || total == 0 || downloaded >= total {
            return None;
        }
        Some((total - downloaded) as f64 / speed)
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            url: self.url.clone(),
            file_name: self.file_name.lock().expect("file_name mutex poisoned").clone(),
            save_path: self.save_path.clone(),
            total_size: self.total_size.load(Ordering::SeqCst),
            downloaded_size: self.downloaded_size.load(Ordering::SeqCst),
            bytes_per_second: *self.bytes_per_second.lock().expect("speed mutex poisoned"),
            eta_seconds: self.eta_seconds(),
            status: self.status(),
            progress_percent: self.progress_percent(),
            thread_count: self.thread_count,
            error_message: self
                .error_message
                .lock()
                .expect("error_message mutex poisoned")
                .clone(),
            expected_md5: self.expected_md5.clone(),
            verified: self.verified.load(Ordering::SeqCst),
            retry_count: self.retry_count.load(Ordering::SeqCst),
        }
    }
}

/// Read-only point-in-time view of a task, returned by `getTaskInfo`/`getAllTasks`.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub url: String,
    pub file_name: String,
    pub save_path: std::path::PathBuf,
    pub total_size: u64,
    pub downloaded_size: u64,
    pub bytes_per_second: f64,
    pub eta_seconds: Option<f64>,
    pub status: TaskStatus,
    pub progress_percent: f64,
    pub thread_count: u32,
    pub error_message: Option<String>,
    pub expected_md5: Option<String>,
    pub verified: bool,
    pub retry_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_clamps_thread_count() {
        let t = Task::new("a".into(), "http://x".into(), "/tmp/a".into(), 99, None);
        assert_eq!(t.thread_count, 16);
        let t2 = Task::new("b".into(), "http://x".into(), "/tmp/b".into(), 0, None);
        assert_eq!(t2.thread_count, 1);
    }

    #[test]
    fn progress_percent_zero_when_total_unknown() {
        let t = Task::new("a".into(), "http://x".into(), "/tmp/a".into(), 1, None);
        assert_eq!(t.progress_percent(), 0.0);
    }

    #[test]
    fn progress_percent_computed() {
        let t = Task::new("a".into(), "http://x".into(), "/tmp/a".into(), 1, None);
        t.total_size.store(1000, Ordering::SeqCst);
        t.downloaded_size.store(250, Ordering::SeqCst);
        assert_eq!(t.progress_percent(), 25.0);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Downloading.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
    }
}
