//! Position sources.
//!
//! The rest of the rover only sees the [`PositionSource`] trait: an async
//! pull that yields the next report as a [`GpsFix`] or "no fix". The real
//! receiver is reached through a local `gpsd` daemon ([`GpsdSource`]); the
//! simulated source lives in [`crate::sim`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pirover_types::{GpsFix, RoverError};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

/// Default `gpsd` endpoint.
pub const DEFAULT_GPSD_ADDR: &str = "127.0.0.1:2947";

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";
const MS_TO_KMH: f64 = 3.6;

#[async_trait]
pub trait PositionSource: Send {
    /// Wait for the next position report.
    ///
    /// `Ok(None)` means the receiver reported but has no fix. The caller is
    /// expected to bound the wait; a source may never report at all.
    async fn next_fix(&mut self) -> Result<Option<GpsFix>, RoverError>;
}

// ────────────────────────────────────────────────────────────────────────────
// gpsd wire reports
// ────────────────────────────────────────────────────────────────────────────

/// The subset of gpsd JSON reports the rover cares about.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "class")]
pub enum GpsdReport {
    #[serde(rename = "TPV")]
    Tpv(TpvReport),
    #[serde(rename = "SKY")]
    Sky(SkyReport),
    #[serde(other)]
    Other,
}

/// Time-position-velocity report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TpvReport {
    /// 0/1 = no fix, 2 = 2D, 3 = 3D.
    #[serde(default)]
    pub mode: u8,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(alias = "altMSL")]
    pub alt: Option<f64>,
    /// Ground speed in m/s.
    pub speed: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SkyReport {
    #[serde(rename = "uSat")]
    pub used_satellites: Option<u8>,
    #[serde(default)]
    pub satellites: Vec<SkySatellite>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SkySatellite {
    #[serde(default)]
    pub used: bool,
}

impl SkyReport {
    pub fn satellites_in_use(&self) -> u8 {
        self.used_satellites.unwrap_or_else(|| {
            let used = self.satellites.iter().filter(|s| s.used).count();
            u8::try_from(used).unwrap_or(u8::MAX)
        })
    }
}

impl TpvReport {
    /// Build a fix from this report, or `None` without a 2D/3D solution.
    ///
    /// gpsd may send TPV before the first SKY; a 2D/3D solution implies at
    /// least one satellite, so the count never drops to zero here.
    pub fn to_fix(&self, satellites: u8) -> Option<GpsFix> {
        if self.mode < 2 {
            return None;
        }
        let (latitude, longitude) = (self.lat?, self.lon?);
        let fix = GpsFix {
            latitude,
            longitude,
            altitude_m: self.alt,
            speed_kmh: self.speed.map(|ms| ms * MS_TO_KMH),
            satellites: satellites.max(1),
            timestamp: self.time.unwrap_or_else(Utc::now),
        };
        fix.is_valid().then_some(fix)
    }
}

/// Parse one line of gpsd output.
///
/// # Errors
///
/// Returns [`RoverError::HardwareFault`] for lines that are not JSON objects
/// with a `class` field.
pub fn parse_report(line: &str) -> Result<GpsdReport, RoverError> {
    serde_json::from_str(line).map_err(|e| RoverError::HardwareFault {
        component: "gpsd".to_string(),
        details: format!("malformed report: {e}"),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// GpsdSource
// ────────────────────────────────────────────────────────────────────────────

/// Position source backed by a gpsd daemon over TCP.
pub struct GpsdSource {
    lines: Lines<BufReader<TcpStream>>,
    satellites: u8,
}

impl GpsdSource {
    /// Connect to gpsd at `addr` and enable JSON watch mode.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] when the daemon is unreachable.
    pub async fn connect(addr: &str) -> Result<Self, RoverError> {
        let fault = |e: std::io::Error| RoverError::HardwareFault {
            component: "gpsd".to_string(),
            details: format!("{addr}: {e}"),
        };
        let mut stream = TcpStream::connect(addr).await.map_err(fault)?;
        stream.write_all(WATCH_COMMAND).await.map_err(fault)?;
        info!(%addr, "connected to gpsd");
        Ok(Self {
            lines: BufReader::new(stream).lines(),
            satellites: 0,
        })
    }
}

#[async_trait]
impl PositionSource for GpsdSource {
    async fn next_fix(&mut self) -> Result<Option<GpsFix>, RoverError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| RoverError::HardwareFault {
                    component: "gpsd".to_string(),
                    details: e.to_string(),
                })?
                .ok_or_else(|| RoverError::HardwareFault {
                    component: "gpsd".to_string(),
                    details: "connection closed".to_string(),
                })?;

            match parse_report(&line) {
                Ok(GpsdReport::Tpv(tpv)) => return Ok(tpv.to_fix(self.satellites)),
                Ok(GpsdReport::Sky(sky)) => {
                    self.satellites = sky.satellites_in_use();
                    trace!(satellites = self.satellites, "gpsd sky report");
                }
                Ok(GpsdReport::Other) => {}
                Err(e) => debug!(error = %e, "skipping gpsd line"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn tpv_3d_fix_converts_speed_to_kmh() {
        let report = parse_report(
            r#"{"class":"TPV","mode":3,"lat":52.52,"lon":13.405,"alt":34.0,"speed":10.0,"time":"2025-05-01T12:00:00.000Z"}"#,
        )
        .unwrap();
        let GpsdReport::Tpv(tpv) = report else {
            panic!("expected TPV, got {report:?}");
        };
        let fix = tpv.to_fix(7).unwrap();
        assert!((fix.latitude - 52.52).abs() < 1e-9);
        assert!((fix.speed_kmh.unwrap() - 36.0).abs() < 1e-9);
        assert_eq!(fix.altitude_m, Some(34.0));
        assert_eq!(fix.satellites, 7);
    }

    #[test]
    fn tpv_without_solution_is_no_fix() {
        let GpsdReport::Tpv(tpv) = parse_report(r#"{"class":"TPV","mode":1}"#).unwrap() else {
            panic!("expected TPV");
        };
        assert!(tpv.to_fix(5).is_none());
    }

    #[test]
    fn sky_counts_used_satellites_when_usat_missing() {
        let GpsdReport::Sky(sky) = parse_report(
            r#"{"class":"SKY","satellites":[{"used":true},{"used":false},{"used":true}]}"#,
        )
        .unwrap() else {
            panic!("expected SKY");
        };
        assert_eq!(sky.satellites_in_use(), 2);
    }

    #[test]
    fn unknown_class_is_ignored_and_garbage_is_an_error() {
        assert_eq!(
            parse_report(r#"{"class":"VERSION","release":"3.25"}"#).unwrap(),
            GpsdReport::Other
        );
        assert!(parse_report("not json").is_err());
    }

    #[tokio::test]
    async fn gpsd_source_reads_sky_then_tpv() -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await?;
            let mut watch = [0u8; 64];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut watch).await?;
            socket
                .write_all(
                    b"{\"class\":\"VERSION\"}\n{\"class\":\"SKY\",\"uSat\":9}\n{\"class\":\"TPV\",\"mode\":2,\"lat\":1.5,\"lon\":2.5}\n",
                )
                .await?;
            Ok::<_, std::io::Error>(socket)
        });

        let mut source = GpsdSource::connect(&addr).await?;
        let fix = source.next_fix().await?.expect("TPV with mode 2 is a fix");
        assert_eq!(fix.satellites, 9);
        assert!((fix.longitude - 2.5).abs() < 1e-9);

        let _socket = server.await??;
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_gpsd_is_hardware_fault() {
        // Bind then drop to get a port nobody is listening on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let err = GpsdSource::connect(&addr).await.err().unwrap();
        assert!(matches!(err, RoverError::HardwareFault { ref component, .. } if component == "gpsd"));
    }
}
