//! Manual ordering arithmetic.
//!
//! manual_order is an unbounded float used as a tiebreak among tasks with no
//! dependency relation. New tasks land at the end; insertions between
//! neighbors bisect, and bisection that runs out of representable values
//! fails with [`Error::OrderExhausted`] instead of colliding two orders.

use crate::error::{Error, Result};

/// Spacing between consecutive orders on creation and after reindex.
const STEP: f64 = 10.0;

/// Order for a task created with no positioning hint.
pub fn initial(max_order: Option<f64>) -> f64 {
    match max_order {
        Some(max) => max + STEP,
        None => STEP,
    }
}

/// Order for a task placed directly after `a`.
pub fn after(a: f64) -> f64 {
    a + STEP
}

/// Order for a task placed directly before `b`.
pub fn before(b: f64) -> f64 {
    b - STEP
}

/// Order for a task placed between neighbors `a` and `b`.
///
/// Fails when the midpoint equals either bound at f64 precision: there is no
/// representable value strictly between them and the caller must reindex.
pub fn midpoint(a: f64, b: f64) -> Result<f64> {
    let mid = (a + b) / 2.0;
    if mid == a || mid == b {
        return Err(Error::OrderExhausted);
    }
    Ok(mid)
}

/// New orders for a full rewrite: 10, 20, 30, … in the order given.
pub fn reindex(ids: &[i64]) -> Vec<(i64, f64)> {
    ids.iter()
        .enumerate()
        .map(|(i, &id)| (id, (i as f64 + 1.0) * STEP))
        .collect()
}
