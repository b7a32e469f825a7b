//! Callback bus (C10): four user-settable sinks invoked under one mutex so
//! the user observes a single serialized stream.
//!
//! `complete` fires exactly once per task reaching `Completed`. `error` may
//! fire multiple times (once per attempt, `will_retry = true`) and at most
//! once more with `will_retry = false` on terminal error.

use std::sync::Mutex;

use crate::task::TaskStatus;

type ProgressFn = Box<dyn Fn(&str, f64, u64, u64, f64) + Send>;
type CompleteFn = Box<dyn Fn(&str, &str) + Send>;
type ErrorFn = Box<dyn Fn(&str, &str, bool) + Send>;
type StatusFn = Box<dyn Fn(&str, TaskStatus) + Send>;

#[derive(Default)]
struct Sinks {
    progress: Option<ProgressFn>,
    complete: Option<CompleteFn>,
    error: Option<ErrorFn>,
    status: Option<StatusFn>,
}

/// Holds the four callback sinks behind a single mutex.
pub struct Callbacks {
    sinks: Mutex<Sinks>,
}

impl Default for Callbacks {
    fn default() -> Self {
        Callbacks {
            sinks: Mutex::new(Sinks::default()),
        }
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_progress<F>(&self, f: F)
    where
        F: Fn(&str, f64, u64, u64, f64) + Send + 'static,
    {
        self.sinks.lock().expect("callbacks mutex poisoned").progress = Some(Box::new(f));
    }

    pub fn set_complete<F>(&self, f: F)
    where
        F: Fn(&str, &str) + Send + 'static,
    {
        self.sinks.lock().expect("callbacks mutex poisoned").complete = Some(Box::new(f));
    }

    pub fn set_error<F>(&self, f: F)
    where
        F: Fn(&str, &str, bool) + Send + 'static,
    {
        self.sinks.lock().expect("callbacks mutex poisoned").error = Some(Box::new(f));
    }

    pub fn set_status<F>(&self, f: F)
    where
        F: Fn(&str, TaskStatus) + Send + 'static,
    {
        self.sinks.lock().expect("callbacks mutex poisoned").status = Some(Box::new(f));
    }

    /// `percent` in `[0, 100]`; `bytes_per_second` is the current smoothed rate.
    pub fn progress(&self, id: &str, percent: f64, downloaded: u64, total: u64, bytes_per_second: f64) {
        let sinks = self.sinks.lock().expect("callbacks mutex poisoned");
        if let Some(f) = &sinks.progress {
            f(id, percent, downloaded, total, bytes_per_second);
        }
    }

    pub fn complete(&self, id: &str, final_path: &str) {
        let sinks = self.sinks.lock().expect("callbacks mutex poisoned");
        if let Some(f) = &sinks.complete {
            f(id, final_path);
        }
    }

    pub fn error(&self, id: &str, message: &str, will_retry: bool) {
        let sinks = self.sinks.lock().expect("callbacks mutex poisoned");
        if let Some(f) = &sinks.error {
            f(id, message, will_retry);
        }
    }

    pub fn status(&self, id: &str, new_status: TaskStatus) {
        let sinks = self.sinks.lock().expect("callbacks mutex poisoned");
        if let Some(f) = &sinks.status {
            f(id, new_status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn complete_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let callbacks = Callbacks::new();
        let c = Arc::clone(&calls);
        callbacks.set_complete(move |_id, _path| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        callbacks.complete("t1", "/tmp/out.bin");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unset_sink_is_noop() {
        let callbacks = Callbacks::new();
        callbacks.progress("t1", 50.0, 500, 1000, 100.0);
        callbacks.status("t1", TaskStatus::Downloading);
    }

    #[test]
    fn status_updates_reach_sink() {
        let callbacks = Callbacks::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        callbacks.set_status(move |id, status| {
            s.lock().unwrap().push((id.to_string(), status));
        });
        callbacks.status("t1", TaskStatus::Downloading);
        callbacks.status("t1", TaskStatus::Completed);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].1, TaskStatus::Completed);
    }
}
