//! GPX course parser for race import

use chrono::{DateTime, NaiveDate, Utc};
use uc_common::db::models::{DistanceType, ImportSource, TerrainType};

use crate::detect::strip_bom;
use crate::error::{ImportError, Result};
use crate::geo::{haversine_miles, ElevationTracker};
use crate::types::RaceDraft;

/// Climb rate (feet per mile) at or above which a course counts as mountain
pub const MOUNTAIN_FEET_PER_MILE: f64 = 200.0;
/// Climb rate (feet per mile) at or above which a course counts as trail
pub const TRAIL_FEET_PER_MILE: f64 = 75.0;

/// Course statistics extracted from a GPX file
#[derive(Debug, Clone, PartialEq)]
pub struct GpxSummary {
    pub name: String,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub distance_miles: f64,
    pub elevation_gain_feet: f64,
    pub elevation_loss_feet: f64,
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub point_count: usize,
}

struct CoursePoint {
    latitude: f64,
    longitude: f64,
    elevation: Option<f64>,
    time: Option<DateTime<Utc>>,
}

/// Convert gpx Time to chrono DateTime
fn gpx_time_to_chrono(time: gpx::Time) -> Option<DateTime<Utc>> {
    // gpx::Time wraps time::OffsetDateTime, convert via string format
    let formatted = time.format().ok()?;
    DateTime::parse_from_rfc3339(&formatted)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn to_course_point(point: gpx::Waypoint) -> CoursePoint {
    CoursePoint {
        latitude: point.point().y(),
        longitude: point.point().x(),
        elevation: point.elevation,
        time: point.time.and_then(gpx_time_to_chrono),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn file_stem(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.replace(['_', '-'], " ").trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Imported Race".to_string())
}

/// Parse GPX content into a course summary
///
/// `file_name` supplies the race name when the file carries none.
pub fn parse_gpx(content: &[u8], file_name: &str) -> Result<GpxSummary> {
    let content_str = std::str::from_utf8(strip_bom(content))
        .map_err(|e| ImportError::Encoding(format!("GPX is not valid UTF-8: {}", e)))?;

    if !content_str.contains("<gpx") {
        return Err(ImportError::InvalidGpx("missing <gpx> root element".to_string()));
    }

    let mut gpx_data: gpx::Gpx = gpx::read(content_str.as_bytes())
        .map_err(|e| ImportError::InvalidGpx(format!("GPX parse error: {}", e)))?;
    let metadata = gpx_data.metadata.take();

    let track_name = gpx_data.tracks.first().and_then(|t| non_empty(t.name.clone()));
    let route_name = gpx_data.routes.first().and_then(|r| non_empty(r.name.clone()));
    let metadata_name = metadata.as_ref().and_then(|m| non_empty(m.name.clone()));

    let description = gpx_data
        .tracks
        .first()
        .and_then(|t| non_empty(t.description.clone()))
        .or_else(|| gpx_data.routes.first().and_then(|r| non_empty(r.description.clone())))
        .or_else(|| metadata.as_ref().and_then(|m| non_empty(m.description.clone())));

    let metadata_time = metadata.and_then(|m| m.time).and_then(gpx_time_to_chrono);

    // Tracks first, then routes, then bare waypoints
    let mut points: Vec<CoursePoint> = gpx_data
        .tracks
        .into_iter()
        .flat_map(|t| t.segments)
        .flat_map(|s| s.points)
        .map(to_course_point)
        .collect();

    if points.is_empty() {
        points = gpx_data
            .routes
            .into_iter()
            .flat_map(|r| r.points)
            .map(to_course_point)
            .collect();
    }

    if points.is_empty() {
        points = gpx_data.waypoints.into_iter().map(to_course_point).collect();
    }

    if points.len() < 2 {
        return Err(ImportError::InvalidGpx(format!(
            "need at least 2 points, found {}",
            points.len()
        )));
    }

    if let Some(bad) = points.iter().find(|p| {
        !(-90.0..=90.0).contains(&p.latitude) || !(-180.0..=180.0).contains(&p.longitude)
    }) {
        return Err(ImportError::InvalidGpx(format!(
            "coordinate out of range: {}, {}",
            bad.latitude, bad.longitude
        )));
    }

    let distance_miles: f64 = points
        .windows(2)
        .map(|w| haversine_miles(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
        .sum();

    let mut tracker = ElevationTracker::new();
    for elevation in points.iter().filter_map(|p| p.elevation) {
        tracker.push(elevation);
    }

    let date = metadata_time
        .or_else(|| points.iter().find_map(|p| p.time))
        .map(|t| t.date_naive());

    let name = track_name
        .or(route_name)
        .or(metadata_name)
        .unwrap_or_else(|| file_stem(file_name));

    tracing::debug!(
        "Parsed GPX '{}': {} points, {:.2} mi, +{:.0} ft",
        name,
        points.len(),
        distance_miles,
        tracker.gain_feet()
    );

    Ok(GpxSummary {
        name,
        description,
        date,
        distance_miles,
        elevation_gain_feet: tracker.gain_feet(),
        elevation_loss_feet: tracker.loss_feet(),
        start_latitude: points[0].latitude,
        start_longitude: points[0].longitude,
        point_count: points.len(),
    })
}

/// Infer terrain from the climb rate of a course
pub fn infer_terrain(distance_miles: f64, elevation_gain_feet: f64) -> TerrainType {
    if distance_miles <= 0.0 {
        return TerrainType::Trail;
    }
    let feet_per_mile = elevation_gain_feet / distance_miles;
    if feet_per_mile >= MOUNTAIN_FEET_PER_MILE {
        TerrainType::Mountain
    } else if feet_per_mile >= TRAIL_FEET_PER_MILE {
        TerrainType::Trail
    } else {
        TerrainType::Road
    }
}

impl GpxSummary {
    /// Convert the summary into a race draft
    pub fn into_draft(self) -> RaceDraft {
        let distance_miles = (self.distance_miles * 100.0).round() / 100.0;
        let elevation_gain_feet = self.elevation_gain_feet.round();
        let location = self.description.unwrap_or_else(|| {
            format!("{:.4}, {:.4}", self.start_latitude, self.start_longitude)
        });

        RaceDraft {
            name: self.name,
            date: self.date,
            distance_miles,
            distance_type: DistanceType::classify(distance_miles),
            location,
            elevation_gain_feet,
            terrain_type: infer_terrain(distance_miles, elevation_gain_feet),
            website_url: None,
            notes: None,
            import_source: ImportSource::Gpx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata>
    <name>Metadata Name</name>
    <time>2025-06-28T05:00:00Z</time>
  </metadata>
  <trk>
    <name>Canyon Loop 50K</name>
    <trkseg>
      <trkpt lat="39.0" lon="-120.0"><ele>1000</ele></trkpt>
      <trkpt lat="39.1" lon="-120.0"><ele>1100</ele></trkpt>
      <trkpt lat="39.2" lon="-120.0"><ele>1050</ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_parse_track_summary() {
        let summary = parse_gpx(SAMPLE_GPX.as_bytes(), "course.gpx").unwrap();
        assert_eq!(summary.name, "Canyon Loop 50K");
        assert_eq!(summary.point_count, 3);
        assert_eq!(summary.date, NaiveDate::from_ymd_opt(2025, 6, 28));
        // 0.2 degrees of latitude
        assert!((summary.distance_miles - 13.82).abs() < 0.05);
        assert!((summary.elevation_gain_feet - 328.084).abs() < 0.01);
        assert!((summary.elevation_loss_feet - 164.042).abs() < 0.01);
    }

    #[test]
    fn test_waypoints_and_file_stem_fallback() {
        let gpx = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="10.0" lon="10.0"><time>2025-03-01T08:00:00Z</time></wpt>
  <wpt lat="10.01" lon="10.0"></wpt>
</gpx>"#;
        let summary = parse_gpx(gpx.as_bytes(), "spring_fling-10k.gpx").unwrap();
        assert_eq!(summary.name, "spring fling 10k");
        assert_eq!(summary.date, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(summary.elevation_gain_feet, 0.0);
    }

    #[test]
    fn test_single_point_rejected() {
        let gpx = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="10.0" lon="10.0"></wpt>
</gpx>"#;
        assert!(matches!(
            parse_gpx(gpx.as_bytes(), "x.gpx"),
            Err(ImportError::InvalidGpx(_))
        ));
    }

    #[test]
    fn test_not_gpx_rejected() {
        assert!(matches!(
            parse_gpx(b"<html></html>", "x.gpx"),
            Err(ImportError::InvalidGpx(_))
        ));
    }

    #[test]
    fn test_infer_terrain() {
        assert_eq!(infer_terrain(10.0, 2500.0), TerrainType::Mountain);
        assert_eq!(infer_terrain(10.0, 1000.0), TerrainType::Trail);
        assert_eq!(infer_terrain(26.2, 300.0), TerrainType::Road);
    }

    #[test]
    fn test_into_draft_uses_coordinates_for_location() {
        let summary = parse_gpx(SAMPLE_GPX.as_bytes(), "course.gpx").unwrap();
        let draft = summary.into_draft();
        assert_eq!(draft.location, "39.0000, -120.0000");
        assert_eq!(draft.import_source, ImportSource::Gpx);
        assert_eq!(draft.distance_type, DistanceType::HalfMarathon);
        assert!(draft.validate().is_empty());
    }
}
