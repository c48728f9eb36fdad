//! Fuzzy matching of CSV column headers to race fields

use std::collections::BTreeMap;

use crate::error::{ImportError, Result};

/// Minimum Jaro-Winkler similarity for a fuzzy header match
pub const HEADER_MATCH_THRESHOLD: f64 = 0.88;

/// Race attribute a CSV column can supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RaceField {
    Name,
    Date,
    Location,
    DistanceMiles,
    DistanceKm,
    DistanceType,
    ElevationGainFeet,
    ElevationGainMeters,
    TerrainType,
    WebsiteUrl,
    Notes,
}

impl RaceField {
    pub const ALL: [RaceField; 11] = [
        RaceField::Name,
        RaceField::Date,
        RaceField::Location,
        RaceField::DistanceMiles,
        RaceField::DistanceKm,
        RaceField::DistanceType,
        RaceField::ElevationGainFeet,
        RaceField::ElevationGainMeters,
        RaceField::TerrainType,
        RaceField::WebsiteUrl,
        RaceField::Notes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RaceField::Name => "name",
            RaceField::Date => "date",
            RaceField::Location => "location",
            RaceField::DistanceMiles => "distance_miles",
            RaceField::DistanceKm => "distance_km",
            RaceField::DistanceType => "distance_type",
            RaceField::ElevationGainFeet => "elevation_gain_feet",
            RaceField::ElevationGainMeters => "elevation_gain_meters",
            RaceField::TerrainType => "terrain_type",
            RaceField::WebsiteUrl => "website_url",
            RaceField::Notes => "notes",
        }
    }

    /// Normalised header spellings accepted for this field
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            RaceField::Name => &["name", "race name", "race", "event", "event name", "title"],
            RaceField::Date => &["date", "race date", "event date", "start date", "when"],
            RaceField::Location => &["location", "city", "place", "venue", "where", "city state"],
            RaceField::DistanceMiles => &[
                "distance",
                "distance miles",
                "distance mi",
                "miles",
                "mi",
                "mileage",
            ],
            RaceField::DistanceKm => &[
                "distance km",
                "distance kilometers",
                "distance kilometres",
                "km",
                "kilometers",
                "kilometres",
            ],
            RaceField::DistanceType => &["distance type", "type", "category", "race type"],
            RaceField::ElevationGainFeet => &[
                "elevation",
                "elevation gain",
                "elevation gain feet",
                "elevation gain ft",
                "elevation ft",
                "gain",
                "vert",
                "vertical",
                "climb",
            ],
            RaceField::ElevationGainMeters => &[
                "elevation m",
                "elevation meters",
                "elevation gain m",
                "elevation gain meters",
                "gain m",
            ],
            RaceField::TerrainType => &["terrain", "terrain type", "surface"],
            RaceField::WebsiteUrl => &["website", "website url", "url", "link", "web"],
            RaceField::Notes => &["notes", "note", "description", "comments", "details"],
        }
    }
}

/// Lowercase, turn `_` `-` `.` into spaces, drop brackets, collapse whitespace
pub fn normalize_header(header: &str) -> String {
    let cleaned: String = header
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '[' | ']' | '{' | '}'))
        .map(|c| if matches!(c, '_' | '-' | '.') { ' ' } else { c })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Field → column index assignment for one CSV file
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    columns: BTreeMap<RaceField, usize>,
    headers: Vec<String>,
}

impl ColumnMap {
    pub fn get(&self, field: RaceField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Field name → original header text, for reporting
    pub fn describe(&self) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .map(|(field, &index)| (field.as_str().to_string(), self.headers[index].clone()))
            .collect()
    }
}

fn score(field: RaceField, header: &str) -> f64 {
    if header.is_empty() {
        return 0.0;
    }
    if field.aliases().contains(&header) {
        return 1.0;
    }
    field
        .aliases()
        .iter()
        .map(|alias| strsim::jaro_winkler(alias, header))
        .fold(0.0, f64::max)
}

/// Assign CSV columns to race fields
///
/// Candidate pairs are taken greedily in descending score order so every
/// field and every column is used at most once. Exact alias matches score
/// 1.0 and therefore always win over fuzzy ones.
pub fn match_headers(headers: &[String]) -> Result<ColumnMap> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

    let mut candidates: Vec<(f64, RaceField, usize)> = Vec::new();
    for field in RaceField::ALL {
        for (index, header) in normalized.iter().enumerate() {
            let s = score(field, header);
            if s >= HEADER_MATCH_THRESHOLD {
                candidates.push((s, field, index));
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut columns = BTreeMap::new();
    let mut used = vec![false; headers.len()];
    for (s, field, index) in candidates {
        if columns.contains_key(&field) || used[index] {
            continue;
        }
        if s < 1.0 {
            tracing::debug!("Fuzzy header match '{}' -> {} ({:.2})", headers[index], field.as_str(), s);
        }
        columns.insert(field, index);
        used[index] = true;
    }

    if !columns.contains_key(&RaceField::Name) {
        return Err(ImportError::MissingColumn(format!(
            "no race name column among: {}",
            headers.join(", ")
        )));
    }

    Ok(ColumnMap {
        columns,
        headers: headers.to_vec(),
    })
}
