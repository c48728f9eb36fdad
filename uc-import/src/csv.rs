//! CSV race list parser

use std::collections::BTreeMap;

use serde::Serialize;
use uc_common::db::models::{DistanceType, ImportSource, TerrainType};

use crate::dates::{detect_date_format, parse_date};
use crate::detect::strip_bom;
use crate::error::{ImportError, Result};
use crate::geo::{KM_TO_MILES, METERS_TO_FEET};
use crate::headers::{match_headers, ColumnMap, RaceField};
use crate::types::{ImportLimits, RaceDraft, RowError};

/// Outcome of parsing a CSV file
#[derive(Debug, Clone, Serialize)]
pub struct CsvImport {
    pub drafts: Vec<RaceDraft>,
    /// 1-based line number of each draft, parallel to `drafts`
    pub lines: Vec<u64>,
    pub row_errors: Vec<RowError>,
    pub date_format: Option<String>,
    pub column_map: BTreeMap<String, String>,
}

/// Pick the delimiter that occurs most often in the header line
pub fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    [b',', b';', b'\t']
        .into_iter()
        .map(|d| (d, header.bytes().filter(|b| *b == d).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

/// Parse a number that may carry units or thousands separators
///
/// "50 mi" → 50, "1,234 ft" → 1234, "42,2" → 42.2.
pub fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    let start = value.find(|c: char| c.is_ascii_digit() || c == '-' || c == '.')?;
    let numeric: String = value[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    let normalized = if numeric.contains('.') {
        numeric.replace(',', "")
    } else if let Some(pos) = numeric.rfind(',') {
        // A single comma followed by anything but three digits is a decimal comma
        let decimals = numeric.len() - pos - 1;
        if numeric.matches(',').count() == 1 && decimals != 3 {
            numeric.replace(',', ".")
        } else {
            numeric.replace(',', "")
        }
    } else {
        numeric
    };

    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Lenient distance category parsing ("50k", "100 miles", "half")
pub fn parse_distance_type(value: &str) -> Option<DistanceType> {
    let compact: String = value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();

    if let Some(exact) = DistanceType::ALL
        .iter()
        .find(|t| t.as_str().to_lowercase().replace(' ', "") == compact)
    {
        return Some(*exact);
    }

    let parsed = match compact.as_str() {
        "5km" | "5000m" => DistanceType::FiveK,
        "10km" | "10000m" => DistanceType::TenK,
        "half" | "halfmarathon" | "21k" | "21km" | "21.1k" | "21.1km" | "13.1" | "13.1mi" => {
            DistanceType::HalfMarathon
        }
        "full" | "fullmarathon" | "42k" | "42km" | "42.2k" | "42.2km" | "26.2" | "26.2mi" => {
            DistanceType::Marathon
        }
        "50km" => DistanceType::FiftyK,
        "50mi" | "50mile" | "50miles" | "50miler" => DistanceType::FiftyMile,
        "100km" => DistanceType::HundredK,
        "100mi" | "100mile" | "100miles" | "100miler" => DistanceType::HundredMile,
        _ => return None,
    };
    Some(parsed)
}

/// Lenient terrain parsing
pub fn parse_terrain(value: &str) -> Option<TerrainType> {
    let lower = value.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower.contains("mixed") {
        Some(TerrainType::Mixed)
    } else if ["mountain", "alpine", "sky"].iter().any(|k| lower.contains(k)) {
        Some(TerrainType::Mountain)
    } else if ["road", "paved", "street", "asphalt"].iter().any(|k| lower.contains(k)) {
        Some(TerrainType::Road)
    } else if ["trail", "dirt", "single", "gravel"].iter().any(|k| lower.contains(k)) {
        Some(TerrainType::Trail)
    } else {
        None
    }
}

struct Row {
    line: u64,
    fields: Vec<String>,
}

impl Row {
    fn get(&self, map: &ColumnMap, field: RaceField) -> Option<&str> {
        map.get(field)
            .and_then(|i| self.fields.get(i))
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// 1-based file line of a record read from byte `offset`
///
/// The reader reports the offset where it stood before any blank lines it
/// skipped, so those are stepped over here.
fn physical_line(text: &str, offset: u64) -> u64 {
    let bytes = text.as_bytes();
    let offset = (offset as usize).min(bytes.len());
    let before = &bytes[..offset];
    let terminators = before
        .iter()
        .enumerate()
        .filter(|&(i, &b)| b == b'\n' || (b == b'\r' && before.get(i + 1) != Some(&b'\n')))
        .count();
    let mut line = terminators as u64 + 1;
    let mut rest = &bytes[offset..];
    loop {
        rest = match rest {
            [b'\r', b'\n', tail @ ..] | [b'\n', tail @ ..] | [b'\r', tail @ ..] => tail,
            _ => break,
        };
        line += 1;
    }
    line
}

/// Parse a CSV race list into drafts and per-row errors
pub fn parse_race_csv(content: &[u8], limits: &ImportLimits) -> Result<CsvImport> {
    let text = std::str::from_utf8(strip_bom(content))
        .map_err(|e| ImportError::Encoding(format!("CSV is not valid UTF-8: {}", e)))?;
    if text.trim().is_empty() {
        return Err(ImportError::InvalidCsv("empty file".to_string()));
    }

    let delimiter = detect_delimiter(text);
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ImportError::InvalidCsv(format!("unreadable header: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let map = match_headers(&headers)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ImportError::InvalidCsv(e.to_string()))?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let line = record
            .position()
            .map(|p| physical_line(text, p.byte()))
            .unwrap_or(rows.len() as u64 + 2);
        rows.push(Row {
            line,
            fields: record.iter().map(|f| f.to_string()).collect(),
        });
    }

    if rows.len() > limits.max_races_per_import {
        return Err(ImportError::TooManyRows {
            rows: rows.len(),
            limit: limits.max_races_per_import,
        });
    }

    let date_values: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.get(&map, RaceField::Date))
        .collect();
    let date_format = detect_date_format(&date_values);

    let mut import = CsvImport {
        drafts: Vec::new(),
        lines: Vec::new(),
        row_errors: Vec::new(),
        date_format: date_format.map(|f| f.to_string()),
        column_map: map.describe(),
    };

    for row in &rows {
        match build_draft(row, &map, date_format) {
            Ok(draft) => {
                import.drafts.push(draft);
                import.lines.push(row.line);
            }
            Err(errors) => import.row_errors.extend(errors),
        }
    }

    tracing::info!(
        "Parsed CSV: {} rows, {} drafts, {} row errors",
        rows.len(),
        import.drafts.len(),
        import.row_errors.len()
    );

    Ok(import)
}

fn row_error(line: u64, field: &str, message: impl Into<String>) -> RowError {
    RowError {
        line,
        field: Some(field.to_string()),
        message: message.into(),
    }
}

fn build_draft(
    row: &Row,
    map: &ColumnMap,
    date_format: Option<&str>,
) -> std::result::Result<RaceDraft, Vec<RowError>> {
    let mut errors = Vec::new();

    let name = row.get(map, RaceField::Name).unwrap_or("").to_string();

    let date = match row.get(map, RaceField::Date) {
        None => None,
        Some(raw) => match date_format.and_then(|f| parse_date(raw, f)) {
            Some(d) => Some(d),
            None => {
                errors.push(row_error(row.line, "date", format!("unrecognised date '{}'", raw)));
                None
            }
        },
    };

    let mut number = |field: RaceField, label: &str| -> Option<f64> {
        let raw = row.get(map, field)?;
        let parsed = parse_number(raw);
        if parsed.is_none() {
            errors.push(row_error(row.line, label, format!("not a number: '{}'", raw)));
        }
        parsed
    };

    let miles = number(RaceField::DistanceMiles, "distance");
    let km = number(RaceField::DistanceKm, "distance");
    let feet = number(RaceField::ElevationGainFeet, "elevation_gain");
    let meters = number(RaceField::ElevationGainMeters, "elevation_gain");

    let declared_type = row.get(map, RaceField::DistanceType).and_then(parse_distance_type);

    let distance_miles = miles
        .or(km.map(|k| k * KM_TO_MILES))
        .or(declared_type.and_then(|t| t.standard_miles()));
    let distance_miles = match distance_miles {
        Some(d) => (d * 100.0).round() / 100.0,
        None => {
            if !errors.iter().any(|e| e.field.as_deref() == Some("distance")) {
                errors.push(row_error(row.line, "distance", "distance is required"));
            }
            0.0
        }
    };

    let elevation_gain_feet = feet
        .or(meters.map(|m| m * METERS_TO_FEET))
        .map(|f| f.round())
        .unwrap_or(0.0);

    let draft = RaceDraft {
        name: name.trim().to_string(),
        date,
        distance_miles,
        distance_type: declared_type.unwrap_or_else(|| DistanceType::classify(distance_miles)),
        location: row.get(map, RaceField::Location).unwrap_or("").to_string(),
        elevation_gain_feet,
        terrain_type: row
            .get(map, RaceField::TerrainType)
            .and_then(parse_terrain)
            .unwrap_or(TerrainType::Trail),
        website_url: row.get(map, RaceField::WebsiteUrl).map(|s| s.to_string()),
        notes: row.get(map, RaceField::Notes).map(|s| s.to_string()),
        import_source: ImportSource::Csv,
    };

    for violation in draft.validate() {
        // A missing distance was already reported above
        if violation.field == "distance" && errors.iter().any(|e| e.field.as_deref() == Some("distance")) {
            continue;
        }
        errors.push(row_error(row.line, violation.field, violation.message));
    }

    if errors.is_empty() {
        Ok(draft)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn limits() -> ImportLimits {
        ImportLimits::default()
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("50 mi"), Some(50.0));
        assert_eq!(parse_number("1,234 ft"), Some(1234.0));
        assert_eq!(parse_number("12,345.5"), Some(12345.5));
        assert_eq!(parse_number("42,2"), Some(42.2));
        assert_eq!(parse_number("~ 31.1"), Some(31.1));
        assert_eq!(parse_number("-20"), Some(-20.0));
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn test_parse_distance_type() {
        assert_eq!(parse_distance_type("50k"), Some(DistanceType::FiftyK));
        assert_eq!(parse_distance_type("100 Miles"), Some(DistanceType::HundredMile));
        assert_eq!(parse_distance_type("Half"), Some(DistanceType::HalfMarathon));
        assert_eq!(parse_distance_type("Half Marathon"), Some(DistanceType::HalfMarathon));
        assert_eq!(parse_distance_type("50M"), Some(DistanceType::FiftyMile));
        assert_eq!(parse_distance_type("ultra"), None);
    }

    #[test]
    fn test_parse_terrain() {
        assert_eq!(parse_terrain("Mountain trail"), Some(TerrainType::Mountain));
        assert_eq!(parse_terrain("paved road"), Some(TerrainType::Road));
        assert_eq!(parse_terrain("Mixed"), Some(TerrainType::Mixed));
        assert_eq!(parse_terrain("singletrack"), Some(TerrainType::Trail));
        assert_eq!(parse_terrain("sand"), None);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("name;date;distance\n"), b';');
        assert_eq!(detect_delimiter("name\tdate\n"), b'\t');
        assert_eq!(detect_delimiter("name\n"), b',');
    }

    #[test]
    fn test_basic_import() {
        let csv = "Race Name,Date,Distance (km),Location,Elevation (m),Terrain\n\
                   Lake Sonoma 50,04/12/2025,80.5,\"Healdsburg, CA\",3200,trail\n\
                   Boston Marathon,04/21/2025,42.2,\"Boston, MA\",250,road\n";
        let import = parse_race_csv(csv.as_bytes(), &limits()).unwrap();

        assert!(import.row_errors.is_empty(), "{:?}", import.row_errors);
        assert_eq!(import.drafts.len(), 2);
        assert_eq!(import.lines, vec![2, 3]);
        assert_eq!(import.date_format.as_deref(), Some("%m/%d/%Y"));

        let sonoma = &import.drafts[0];
        assert_eq!(sonoma.date, NaiveDate::from_ymd_opt(2025, 4, 12));
        assert!((sonoma.distance_miles - 50.02).abs() < 0.01);
        assert_eq!(sonoma.distance_type, DistanceType::FiftyMile);
        assert_eq!(sonoma.location, "Healdsburg, CA");
        assert_eq!(sonoma.elevation_gain_feet, 10499.0);
        assert_eq!(sonoma.import_source, ImportSource::Csv);

        let boston = &import.drafts[1];
        assert_eq!(boston.distance_type, DistanceType::Marathon);
        assert_eq!(boston.terrain_type, TerrainType::Road);
    }

    #[test]
    fn test_row_errors_carry_line_numbers() {
        let csv = "name;date;distance;website\n\
                   ;2025-05-01;31;\n\
                   \n\
                   Too Far;2025-05-02;1500;\n\
                   Bad Date;someday;26.2;\n\
                   Bad Url;2025-05-04;13.1;www.example.com\n\
                   Fine;2025-05-05;10;https://example.com\n";
        let import = parse_race_csv(csv.as_bytes(), &limits()).unwrap();

        assert_eq!(import.drafts.len(), 1);
        assert_eq!(import.drafts[0].name, "Fine");
        assert_eq!(import.lines, vec![7]);

        let lines: Vec<(u64, Option<&str>)> = import
            .row_errors
            .iter()
            .map(|e| (e.line, e.field.as_deref()))
            .collect();
        assert_eq!(
            lines,
            vec![
                (2, Some("name")),
                (4, Some("distance")),
                (5, Some("date")),
                (6, Some("website_url")),
            ]
        );
    }

    #[test]
    fn test_line_numbers_count_skipped_blank_lines() {
        let csv = "name,date,distance\r\n\r\n\r\nFirst,2025-05-01,10\r\n\r\nSecond,2025-05-02,20\r\n";
        let import = parse_race_csv(csv.as_bytes(), &limits()).unwrap();
        assert_eq!(import.lines, vec![4, 6]);

        assert_eq!(physical_line("a\n\nb\n", 2), 3);
        assert_eq!(physical_line("a\rb\r", 2), 2);
    }

    #[test]
    fn test_distance_from_type_when_no_distance_column() {
        let csv = "name,type\nCanyons,100K\n";
        let import = parse_race_csv(csv.as_bytes(), &limits()).unwrap();
        assert_eq!(import.drafts[0].distance_type, DistanceType::HundredK);
        assert!((import.drafts[0].distance_miles - 62.14).abs() < 0.001);
    }

    #[test]
    fn test_too_many_rows() {
        let mut csv = String::from("name,distance\n");
        for i in 0..3 {
            csv.push_str(&format!("Race {},10\n", i));
        }
        let limits = ImportLimits {
            max_file_bytes: 1024,
            max_races_per_import: 2,
        };
        assert!(matches!(
            parse_race_csv(csv.as_bytes(), &limits),
            Err(ImportError::TooManyRows { rows: 3, limit: 2 })
        ));
    }

    #[test]
    fn test_missing_name_column() {
        assert!(matches!(
            parse_race_csv(b"distance,date\n10,2025-01-01\n", &limits()),
            Err(ImportError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(
            parse_race_csv(&[0xff, 0xfe, 0x00], &limits()),
            Err(ImportError::Encoding(_))
        ));
    }
}
