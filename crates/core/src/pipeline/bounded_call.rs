use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::shared::error::ServiceError;

use super::segment_result::FailureCause;

/// Runs one external call with a deadline.
///
/// The call runs on its own thread; the caller waits at most `timeout` for
/// the answer. A late call is not interrupted: it finishes in the background
/// and its result is dropped. A panicking call is reported as `Aborted`.
pub fn call_with_timeout<T, F>(name: &str, timeout: Duration, call: F) -> Result<T, FailureCause>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);

    thread::Builder::new()
        .name(format!("call-{name}"))
        .spawn(move || {
            let _ = tx.send(call());
        })
        .map_err(|e| FailureCause::Aborted(format!("failed to spawn {name} call: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(FailureCause::Service(e.to_string())),
        Err(RecvTimeoutError::Timeout) => Err(FailureCause::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(FailureCause::Aborted(format!("{name} call panicked")))
        }
    }
}
