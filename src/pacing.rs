use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Cancelled;

/// Source of time passing; swapped out in tests so no real delay occurs
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delays backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How long to wait between two requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayPolicy {
    Fixed(Duration),
    /// Uniformly drawn from `min..=max`
    Jitter { min: Duration, max: Duration },
}

impl DelayPolicy {
    pub fn jitter(min: Duration, max: Duration) -> Self {
        if min >= max {
            DelayPolicy::Fixed(min)
        } else {
            DelayPolicy::Jitter { min, max }
        }
    }

    pub fn next_delay(&self) -> Duration {
        match *self {
            DelayPolicy::Fixed(delay) => delay,
            DelayPolicy::Jitter { min, max } => {
                let spread = (max - min).as_secs_f64();
                min + Duration::from_secs_f64(spread * fastrand::f64())
            }
        }
    }
}

/// Cancellable waits between requests
#[derive(Clone)]
pub struct Pacer {
    sleeper: Arc<dyn Sleeper>,
}

impl Pacer {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    pub fn tokio() -> Self {
        Self::new(Arc::new(TokioSleeper))
    }

    /// Wait for `delay` unless `cancel` fires first.
    ///
    /// An already-cancelled token returns immediately, even for a zero delay.
    pub async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if delay.is_zero() {
            return Ok(());
        }

        debug!(delay_ms = delay.as_millis() as u64, "Pausing");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = self.sleeper.sleep(delay) => Ok(()),
        }
    }

    /// Wait for the next delay drawn from `policy`
    pub async fn pause_with(
        &self,
        policy: &DelayPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        self.pause(policy.next_delay(), cancel).await
    }
}
