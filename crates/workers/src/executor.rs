//! Single-task executor dispatching timer expirations to a worker

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::shutdown::Shutdown;
use crate::timer::{TimerHandle, TimerQueue};

/// Worker driven by timer expirations.
///
/// Callbacks run one at a time on the executor task, so implementors hold
/// their state without locks. `timers` is the queue that fired, for arming
/// or cancelling timers from inside the callback.
#[async_trait]
pub trait TimerCallback: Send {
    async fn on_timer(&mut self, timer: TimerHandle, timers: &mut TimerQueue);
}

/// Why `spin` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinOutcome {
    /// Shutdown was requested
    Shutdown,
    /// No timers remained armed
    Idle,
}

/// Dispatch due timers to `node` until shutdown or until no timers remain.
pub async fn spin<N>(node: &mut N, timers: &mut TimerQueue, shutdown: &Shutdown) -> SpinOutcome
where
    N: TimerCallback + ?Sized,
{
    loop {
        if shutdown.is_requested() {
            return SpinOutcome::Shutdown;
        }
        let Some(deadline) = timers.next_deadline() else {
            debug!("no timers armed, executor idle");
            return SpinOutcome::Idle;
        };

        tokio::select! {
            biased;
            _ = shutdown.wait() => return SpinOutcome::Shutdown,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let now = Instant::now();
        while let Some(handle) = timers.pop_due(now) {
            node.on_timer(handle, timers).await;
            if shutdown.is_requested() {
                return SpinOutcome::Shutdown;
            }
        }
    }
}
