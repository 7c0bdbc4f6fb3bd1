//! Handler execution deadline.
//!
//! Runs a handler on a worker thread and waits up to the deadline for its
//! result. An elapsed deadline abandons the worker: the thread finishes on
//! its own and its result is dropped, which is safe because handlers are
//! required to keep their side effects atomic (a stalled handler holding the
//! store lock releases it when it eventually completes). There is no
//! rollback of partial effects.

use std::sync::mpsc;
use std::time::Duration;

/// The handler did not finish inside the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded;

/// Run `f`, bounded by `deadline` when one is configured.
///
/// With no deadline the closure runs inline on the calling thread; with one
/// it runs on a spawned worker so the dispatcher can give up waiting.
pub fn run_with_deadline<T, F>(deadline: Option<Duration>, f: F) -> Result<T, DeadlineExceeded>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let Some(deadline) = deadline else {
        return Ok(f());
    };

    let (tx, rx) = mpsc::sync_channel(1);
    std::thread::spawn(move || {
        // The receiver may be gone if the deadline elapsed; that's fine.
        let _ = tx.send(f());
    });

    rx.recv_timeout(deadline).map_err(|_| DeadlineExceeded)
}
