//! Distance and elevation arithmetic

/// Mean Earth radius in miles
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

pub const KM_TO_MILES: f64 = 0.621371;
pub const METERS_TO_FEET: f64 = 3.28084;

/// Elevation change (meters) that must be exceeded before it counts
pub const ELEVATION_HYSTERESIS_METERS: f64 = 3.0;

/// Great-circle distance between two coordinates in miles
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

/// Accumulates climb and descent with a noise threshold
///
/// Changes are measured against the last anchor elevation; the anchor only
/// moves once the difference exceeds [`ELEVATION_HYSTERESIS_METERS`].
#[derive(Debug, Default)]
pub struct ElevationTracker {
    anchor: Option<f64>,
    gain_meters: f64,
    loss_meters: f64,
}

impl ElevationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, elevation_meters: f64) {
        if !elevation_meters.is_finite() {
            return;
        }
        let Some(anchor) = self.anchor else {
            self.anchor = Some(elevation_meters);
            return;
        };

        let delta = elevation_meters - anchor;
        if delta > ELEVATION_HYSTERESIS_METERS {
            self.gain_meters += delta;
            self.anchor = Some(elevation_meters);
        } else if delta < -ELEVATION_HYSTERESIS_METERS {
            self.loss_meters += -delta;
            self.anchor = Some(elevation_meters);
        }
    }

    pub fn gain_feet(&self) -> f64 {
        self.gain_meters * METERS_TO_FEET
    }

    pub fn loss_feet(&self) -> f64 {
        self.loss_meters * METERS_TO_FEET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_latitude() {
        // One degree of latitude is ~69.1 miles
        let d = haversine_miles(45.0, -122.0, 46.0, -122.0);
        assert!((d - 69.09).abs() < 0.1, "got {}", d);
    }

    #[test]
    fn test_haversine_same_point() {
        assert_eq!(haversine_miles(10.0, 10.0, 10.0, 10.0), 0.0);
    }

    #[test]
    fn test_tracker_ignores_noise() {
        let mut tracker = ElevationTracker::new();
        for e in [100.0, 101.0, 99.5, 102.0, 100.5, 101.5] {
            tracker.push(e);
        }
        assert_eq!(tracker.gain_feet(), 0.0);
        assert_eq!(tracker.loss_feet(), 0.0);
    }

    #[test]
    fn test_tracker_counts_real_climbs() {
        let mut tracker = ElevationTracker::new();
        for e in [100.0, 110.0, 120.0, 115.0, 100.0] {
            tracker.push(e);
        }
        assert!((tracker.gain_feet() - 20.0 * METERS_TO_FEET).abs() < 1e-9);
        assert!((tracker.loss_feet() - 20.0 * METERS_TO_FEET).abs() < 1e-9);
    }
}
