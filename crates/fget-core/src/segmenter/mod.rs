//! Range math and segment planning.
//!
//! Splits a download into N segments and computes HTTP Range header bounds.
//! Per-segment completion is tracked on `Task` via `SegmentState`, not here.

mod range;

pub use range::{plan_segments, Segment};
