//! End-to-end race import: detection, parsing and de-duplication

use chrono::{NaiveDate, Utc};
use uc_common::db::models::{DistanceType, ImportSource, Race, TerrainType};
use uc_import::detect::{check_size, detect_format};
use uc_import::dedup::find_race_duplicates;
use uc_import::gpx::parse_gpx;
use uc_import::{csv::parse_race_csv, ImportError, ImportFormat, ImportLimits};
use uuid::Uuid;

const RACE_CALENDAR: &str = "\u{feff}Event;Race Date;Distance;Elevation Gain (ft);City;Website\n\
Javelina Jundred;25/10/2025;100 mi;7,500 ft;Fountain Hills, AZ;https://aravaiparunning.com\n\
Javelina Jundred 2025;25/10/2025;100.5;7500;Fountain Hills, AZ;\n\
Rim to River 100;08/11/2025;100;14000;Hot Springs, NC;https://example.org/r2r\n";

const MOUNTAIN_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="watch" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><desc>Silverton, CO</desc></metadata>
  <trk>
    <name>Steep Climb</name>
    <trkseg>
      <trkpt lat="37.8000" lon="-107.6600"><ele>2800</ele><time>2025-07-11T12:00:00Z</time></trkpt>
      <trkpt lat="37.8050" lon="-107.6600"><ele>2900</ele></trkpt>
      <trkpt lat="37.8100" lon="-107.6600"><ele>3000</ele></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

fn stored_race(name: &str, date: NaiveDate, miles: f64, location: &str) -> Race {
    let now = Utc::now();
    Race {
        id: Uuid::new_v4(),
        name: name.to_string(),
        date: Some(date),
        distance_miles: miles,
        distance_type: DistanceType::classify(miles),
        location: location.to_string(),
        elevation_gain_feet: 0.0,
        terrain_type: TerrainType::Trail,
        website_url: None,
        notes: None,
        import_source: ImportSource::Manual,
        created_by: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn test_csv_calendar_day_first_dates_and_batch_duplicates() {
    let bytes = RACE_CALENDAR.as_bytes();
    check_size("calendar.txt", bytes, ImportLimits::default().max_file_bytes).unwrap();
    assert_eq!(detect_format("calendar.txt", bytes).unwrap(), ImportFormat::Csv);

    let import = parse_race_csv(bytes, &ImportLimits::default()).unwrap();
    assert!(import.row_errors.is_empty(), "{:?}", import.row_errors);
    assert_eq!(import.date_format.as_deref(), Some("%d/%m/%Y"));
    assert_eq!(import.drafts.len(), 3);

    let javelina = &import.drafts[0];
    assert_eq!(javelina.date, NaiveDate::from_ymd_opt(2025, 10, 25));
    assert_eq!(javelina.distance_type, DistanceType::HundredMile);
    assert_eq!(javelina.elevation_gain_feet, 7500.0);
    assert_eq!(javelina.location, "Fountain Hills, AZ");
    assert_eq!(javelina.website_url.as_deref(), Some("https://aravaiparunning.com"));

    assert_eq!(import.column_map.get("name").map(String::as_str), Some("Event"));
    assert_eq!(import.column_map.get("location").map(String::as_str), Some("City"));

    let duplicates = find_race_duplicates(&import.drafts, &[], 0.8);
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].draft_index, 1);
    assert_eq!(duplicates[0].batch_index, Some(0));
}

#[test]
fn test_csv_against_stored_races() {
    let import = parse_race_csv(RACE_CALENDAR.as_bytes(), &ImportLimits::default()).unwrap();
    let stored = vec![stored_race(
        "Rim To River",
        NaiveDate::from_ymd_opt(2025, 11, 9).unwrap(),
        100.0,
        "Hot Springs, NC",
    )];

    let duplicates = find_race_duplicates(&import.drafts, &stored, 0.8);
    let rim = duplicates
        .iter()
        .find(|d| d.draft_index == 2)
        .expect("Rim to River should match the stored race");
    assert_eq!(rim.existing_race_id, Some(stored[0].id));
    assert!(rim.reasons.iter().any(|r| r == "dates 1 days apart"));
}

#[test]
fn test_gpx_to_mountain_draft() {
    let bytes = MOUNTAIN_GPX.as_bytes();
    assert_eq!(detect_format("upload", bytes).unwrap(), ImportFormat::Gpx);

    let draft = parse_gpx(bytes, "upload").unwrap().into_draft();
    assert_eq!(draft.name, "Steep Climb");
    assert_eq!(draft.location, "Silverton, CO");
    assert_eq!(draft.date, NaiveDate::from_ymd_opt(2025, 7, 11));
    assert_eq!(draft.terrain_type, TerrainType::Mountain);
    assert_eq!(draft.distance_type, DistanceType::Custom);
    assert_eq!(draft.import_source, ImportSource::Gpx);
    assert!(draft.validate().is_empty());
}

#[test]
fn test_oversized_upload_rejected_before_parsing() {
    let limits = ImportLimits {
        max_file_bytes: 64,
        max_races_per_import: 100,
    };
    let err = check_size("races.csv", RACE_CALENDAR.as_bytes(), limits.max_file_bytes).unwrap_err();
    assert!(matches!(err, ImportError::TooLarge { limit: 64, .. }));
}
