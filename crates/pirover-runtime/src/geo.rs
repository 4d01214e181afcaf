//! Great-circle geometry between two WGS84 coordinates.
//!
//! Spherical earth, mean radius 6371 km. All angles in degrees at the API,
//! radians inside.

/// Mean earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance and initial bearing from one point to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Course {
    pub distance_m: f64,
    /// Degrees clockwise from true north, `[0, 360)`.
    pub bearing_deg: f64,
}

/// Haversine distance in kilometres from (`lat1`, `lon1`) to (`lat2`, `lon2`).
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Forward azimuth from (`lat1`, `lon1`) towards (`lat2`, `lon2`).
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_lambda = (lon2 - lon1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Distance in metres and bearing from `from` to `to`, each `(lat, lon)`.
pub fn course(from: (f64, f64), to: (f64, f64)) -> Course {
    Course {
        distance_m: haversine_km(from.0, from.1, to.0, to.1) * 1000.0,
        bearing_deg: bearing_deg(from.0, from.1, to.0, to.1),
    }
}
