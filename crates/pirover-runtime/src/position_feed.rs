//! [`PositionFeed`] – pulls reports from a [`PositionSource`] into
//! [`RoverState`].
//!
//! Each wait is bounded by `report_timeout` so the feed keeps noticing
//! cancellation even when the receiver never reports. "No fix" reports and
//! source errors are logged and leave the stored position as it was; staleness
//! is judged by the readers through the fix timestamp.

use std::sync::Arc;
use std::time::Duration;

use pirover_hal::PositionSource;
use pirover_kernel::RoverState;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;

#[derive(Debug, Clone, Copy)]
pub struct PositionFeedConfig {
    pub report_timeout: Duration,
    /// Back-off after a source error.
    pub retry_delay: Duration,
}

impl Default for PositionFeedConfig {
    fn default() -> Self {
        Self {
            report_timeout: Duration::from_secs(2),
            retry_delay: Duration::from_secs(1),
        }
    }
}

pub struct PositionFeed {
    source: Box<dyn PositionSource>,
    state: Arc<RoverState>,
    config: PositionFeedConfig,
}

impl PositionFeed {
    pub fn new(
        source: Box<dyn PositionSource>,
        state: Arc<RoverState>,
        config: PositionFeedConfig,
    ) -> Self {
        Self {
            source,
            state,
            config,
        }
    }

    pub async fn run(mut self, cancel: CancelToken) {
        info!("position feed started");
        let mut had_fix = false;
        while !cancel.is_cancelled() {
            let report = tokio::select! {
                _ = cancel.cancelled() => break,
                r = tokio::time::timeout(self.config.report_timeout, self.source.next_fix()) => r,
            };
            match report {
                Ok(Ok(Some(fix))) if fix.is_valid() => {
                    if !had_fix {
                        info!(satellites = fix.satellites, "GPS fix acquired");
                    }
                    had_fix = true;
                    self.state.set_position(Some(fix));
                }
                Ok(Ok(_)) => {
                    if had_fix {
                        warn!("GPS fix lost");
                    }
                    had_fix = false;
                    debug!("position report without fix");
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "position source failed");
                    if !cancel.sleep(self.config.retry_delay).await {
                        break;
                    }
                }
                Err(_) => debug!(
                    timeout_ms = self.config.report_timeout.as_millis() as u64,
                    "no position report"
                ),
            }
        }
        info!("position feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pirover_hal::sim::SimPositionSource;

    #[tokio::test(start_paused = true)]
    async fn feed_stores_fixes_and_keeps_last_on_loss() {
        let state = Arc::new(RoverState::default());
        let source = SimPositionSource::fixed(47.0, 8.0).with_interval(Duration::from_millis(500));
        let gps = source.handle();
        let cancel = CancelToken::new();
        let task = tokio::spawn(
            PositionFeed::new(Box::new(source), Arc::clone(&state), PositionFeedConfig::default())
                .run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_millis(750)).await;
        let fix = state.position().expect("first report stored");
        assert!((fix.latitude - 47.0).abs() < f64::EPSILON);

        gps.set_position(47.5, 8.5);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!((state.position().unwrap().latitude - 47.5).abs() < f64::EPSILON);

        gps.lose_fix();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!((state.position().unwrap().latitude - 47.5).abs() < f64::EPSILON);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_source_never_sets_position() {
        let state = Arc::new(RoverState::default());
        let source = SimPositionSource::without_fix().with_interval(Duration::from_secs(30));
        let cancel = CancelToken::new();
        let task = tokio::spawn(
            PositionFeed::new(Box::new(source), Arc::clone(&state), PositionFeedConfig::default())
                .run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(state.position().is_none());

        cancel.cancel();
        task.await.unwrap();
    }
}
