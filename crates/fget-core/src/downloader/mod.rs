//! Segment worker dispatch: spawns one OS thread per segment and joins them.

mod segment;
mod single;

pub use segment::{run_segment, SegmentOutcome};
pub use single::run_single_stream;

use std::sync::Arc;

use crate::error::EngineError;
use crate::host_policy::ConnectionBudget;
use crate::ratelimiter::RateLimiter;
use crate::task::Task;
use crate::transport::TransportOptions;

/// Launches one thread per not-yet-completed segment and blocks until all
/// have returned. Each active task may spawn up to 16 segment threads (the
/// task's `threadCount` is already clamped to that range at construction),
/// but each thread blocks on `connection_budget` before opening its socket
/// so the process-wide in-flight connection cap holds across tasks too.
pub fn run_segments_concurrently(
    task: &Arc<Task>,
    transport: &TransportOptions,
    rate_limiter: &Arc<RateLimiter>,
    connection_budget: &Arc<ConnectionBudget>,
) -> Vec<(usize, SegmentOutcome)> {
    let pending: Vec<usize> = {
        let segments = task.segments.lock().expect("segments mutex poisoned");
        (0..segments.len())
            .filter(|&i| !segments[i].completed.load(std::sync::atomic::Ordering::SeqCst))
            .collect()
    };

    let handles: Vec<(usize, std::thread::JoinHandle<SegmentOutcome>)> = pending
        .into_iter()
        .map(|index| {
            let task = Arc::clone(task);
            let transport = transport.clone();
            let rate_limiter = Arc::clone(rate_limiter);
            let connection_budget = Arc::clone(connection_budget);
            let handle = std::thread::spawn(move || {
                let _guard = connection_budget.reserve_blocking();
                run_segment(&task, index, &transport, &rate_limiter)
            });
            (index, handle)
        })
        .collect();

    handles
        .into_iter()
        .map(|(index, handle)| {
            let outcome = handle.join().unwrap_or_else(|_| SegmentOutcome {
                completed: false,
                paused: false,
                error: Some(EngineError::ConnectFailed(
                    "segment worker thread panicked".into(),
                )),
            });
            (index, outcome)
        })
        .collect()
}
