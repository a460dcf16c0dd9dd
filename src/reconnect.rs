use crate::config::BackoffConfig;
use std::future::pending;
use std::pin::Pin;
use tokio::time::{sleep, Duration, Sleep};

/// Arms the single reconnection timer.
///
/// Only one timer can exist: arming replaces it and cancelling drops it,
/// so a cancelled timer can never fire.
#[derive(Debug)]
pub(crate) struct ReconnectScheduler {
    backoff: BackoffConfig,
    timer: Option<Pin<Box<Sleep>>>,
}

impl ReconnectScheduler {
    pub(crate) fn new(backoff: BackoffConfig) -> Self {
        Self {
            backoff,
            timer: None,
        }
    }

    /// Arm the timer for the attempt after `attempts`.
    ///
    /// Returns the delay on success, or `Err(max_attempts)` when the budget
    /// is spent and no timer was armed.
    pub(crate) fn schedule(&mut self, attempts: u32) -> Result<(u32, Duration), u32> {
        let next = attempts.saturating_add(1);
        if next > self.backoff.max_attempts {
            self.timer = None;
            return Err(self.backoff.max_attempts);
        }
        let delay = self.backoff.delay_for_attempt(next);
        self.timer = Some(Box::pin(sleep(delay)));
        Ok((next, delay))
    }

    /// Drop the pending timer, if any
    pub(crate) fn cancel(&mut self) {
        self.timer = None;
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Resolve when the armed timer fires; pending forever when none is armed.
    ///
    /// Cancel-safe. The timer is consumed on firing.
    pub(crate) async fn fired(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.as_mut().await;
                self.timer = None;
            }
            None => pending::<()>().await,
        }
    }
}
