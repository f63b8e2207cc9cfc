//! Process-wide unique name generation
//!
//! Names produced here are used for continuation parameters, temporaries and
//! primitive wrappers. The counter starts at 0 and is never reset, so two names
//! handed out within one process never collide.

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Return `prefix` followed by the next value of the process-wide counter
pub fn gensym(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{}", prefix, n)
}
