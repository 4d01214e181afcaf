//! [`RangeMonitor`] – continuous obstacle sampling.
//!
//! Samples the [`RangeSensor`] once per period on the blocking pool, stores
//! every successful reading in [`RoverState`], and on the rising edge of the
//! warning flag (with avoidance enabled) halts the drive and emits
//! `obstacle_detected`. Missed readings leave the state untouched.

use std::sync::Arc;
use std::time::Duration;

use pirover_hal::RangeSensor;
use pirover_kernel::{CommandArbiter, RangeUpdate};
use pirover_types::{Notification, RoverError};
use tracing::{info, trace, warn};

use crate::cancel::CancelToken;

const SOURCE: &str = "pirover-runtime::range_monitor";

#[derive(Debug, Clone, Copy)]
pub struct RangeMonitorConfig {
    pub period: Duration,
}

impl Default for RangeMonitorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
        }
    }
}

pub struct RangeMonitor {
    sensor: Option<Box<dyn RangeSensor>>,
    arbiter: Arc<CommandArbiter>,
    config: RangeMonitorConfig,
}

impl RangeMonitor {
    pub fn new(
        sensor: Box<dyn RangeSensor>,
        arbiter: Arc<CommandArbiter>,
        config: RangeMonitorConfig,
    ) -> Self {
        Self {
            sensor: Some(sensor),
            arbiter,
            config,
        }
    }

    /// Fold one sample into the shared state.
    ///
    /// Returns the state update for a successful reading, `None` otherwise.
    pub fn apply_reading(&self, reading: Result<Option<f64>, RoverError>) -> Option<RangeUpdate> {
        let distance = match reading {
            Ok(Some(distance)) => distance,
            Ok(None) => {
                trace!("range sample missed");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "range sensor read failed");
                return None;
            }
        };

        let update = self.arbiter.record_distance(distance);
        if update.warning_raised && self.arbiter.state().avoidance_enabled() {
            info!(distance_cm = distance, "obstacle detected, stopping");
            if let Err(e) = self.arbiter.halt() {
                warn!(error = %e, "obstacle stop failed");
            }
            self.arbiter
                .bus()
                .emit(SOURCE, Notification::ObstacleDetected { distance });
        }
        Some(update)
    }

    /// Take one sample on the blocking pool.
    pub async fn sample_once(&mut self) -> Result<Option<f64>, RoverError> {
        let mut sensor = self.sensor.take().ok_or_else(|| RoverError::HardwareFault {
            component: "range_sensor".to_string(),
            details: "sensor lost after a failed sample".to_string(),
        })?;
        let (sensor, reading) = tokio::task::spawn_blocking(move || {
            let reading = sensor.sample();
            (sensor, reading)
        })
        .await
        .map_err(|e| RoverError::HardwareFault {
            component: "range_sensor".to_string(),
            details: format!("sampling task failed: {e}"),
        })?;
        self.sensor = Some(sensor);
        reading
    }

    /// Sample until `cancel` fires.
    pub async fn run(mut self, cancel: CancelToken) {
        info!(period_ms = self.config.period.as_millis() as u64, "range monitor started");
        while !cancel.is_cancelled() {
            let reading = self.sample_once().await;
            if self.sensor.is_none() {
                warn!("range sensor unavailable, monitor exiting");
                break;
            }
            self.apply_reading(reading);
            if !cancel.sleep(self.config.period).await {
                break;
            }
        }
        info!("range monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pirover_hal::sim::{DriveLog, SimDrive, SimRangeHandle, SimRangeSensor};
    use pirover_kernel::RoverState;
    use pirover_middleware::{NotificationBus, Topic};
    use pirover_types::DriveIntent;

    struct Rig {
        monitor: RangeMonitor,
        handle: SimRangeHandle,
        log: DriveLog,
        state: Arc<RoverState>,
        bus: NotificationBus,
    }

    fn rig(avoidance: bool) -> Rig {
        let state = Arc::new(RoverState::new(20.0, avoidance));
        let drive = SimDrive::new();
        let log = drive.log();
        let bus = NotificationBus::default();
        let arbiter = Arc::new(CommandArbiter::new(Arc::clone(&state), Box::new(drive), bus.clone()));
        let sensor = SimRangeSensor::new(150.0);
        let handle = sensor.handle();
        Rig {
            monitor: RangeMonitor::new(Box::new(sensor), arbiter, RangeMonitorConfig::default()),
            handle,
            log,
            state,
            bus,
        }
    }

    #[test]
    fn missed_reading_leaves_state_untouched() {
        let rig = rig(true);
        rig.monitor.apply_reading(Ok(Some(80.0)));
        assert!(rig.monitor.apply_reading(Ok(None)).is_none());
        assert!(
            rig.monitor
                .apply_reading(Err(RoverError::HardwareFault {
                    component: "ranger".into(),
                    details: "echo".into(),
                }))
                .is_none()
        );
        assert!((rig.state.obstacle().distance_cm - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rising_edge_with_avoidance_stops_and_notifies() {
        let rig = rig(true);
        let mut safety = rig.bus.subscribe_to(Topic::Safety);

        rig.monitor.apply_reading(Ok(Some(50.0)));
        assert!(rig.log.is_empty());

        rig.monitor.apply_reading(Ok(Some(15.0)));
        assert_eq!(rig.log.all(), vec![DriveIntent::STOP]);
        let event = safety.try_recv().unwrap();
        assert!(matches!(event.payload, Notification::ObstacleDetected { distance } if distance == 15.0));

        // Staying close does not re-trigger.
        rig.monitor.apply_reading(Ok(Some(12.0)));
        assert_eq!(rig.log.len(), 1);
        assert!(safety.try_recv().is_err());
    }

    #[test]
    fn rising_edge_without_avoidance_only_updates_state() {
        let rig = rig(false);
        let update = rig.monitor.apply_reading(Ok(Some(5.0))).unwrap();
        assert!(update.warning_raised);
        assert!(rig.state.obstacle().warning_active);
        assert!(rig.log.is_empty());
    }

    // Real clock: the sample runs on the blocking pool.
    #[tokio::test]
    async fn run_samples_until_cancelled() {
        let Rig {
            mut monitor,
            handle,
            log,
            state,
            ..
        } = rig(true);
        monitor.config.period = Duration::from_millis(10);
        let cancel = CancelToken::new();
        let task = tokio::spawn(monitor.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!((state.obstacle().distance_cm - 150.0).abs() < f64::EPSILON);

        handle.set_distance(10.0);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(state.obstacle().warning_active);
        assert_eq!(log.last(), Some(DriveIntent::STOP));

        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(200), task)
            .await
            .expect("monitor exits promptly")
            .unwrap();
    }
}
