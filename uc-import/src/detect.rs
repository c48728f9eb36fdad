//! File format detection and size checks

use crate::error::{ImportError, Result};
use crate::types::ImportFormat;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Strip a leading UTF-8 byte order mark
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

fn extension(file_name: &str) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Decide between GPX and CSV
///
/// The file extension wins when it is recognised; otherwise the content is
/// sniffed.
pub fn detect_format(file_name: &str, bytes: &[u8]) -> Result<ImportFormat> {
    match extension(file_name).as_deref() {
        Some("gpx") => return Ok(ImportFormat::Gpx),
        Some("csv") | Some("tsv") => return Ok(ImportFormat::Csv),
        _ => {}
    }

    let content = String::from_utf8_lossy(strip_bom(bytes));
    let trimmed = content.trim_start();

    if trimmed.starts_with("<?xml") || trimmed.contains("<gpx") {
        return Ok(ImportFormat::Gpx);
    }

    let first_line = trimmed.lines().next().unwrap_or("");
    if first_line.contains([',', ';', '\t']) {
        return Ok(ImportFormat::Csv);
    }

    Err(ImportError::UnsupportedFormat(format!(
        "{} is neither GPX nor CSV",
        file_name
    )))
}

/// Reject empty and oversized uploads before parsing
pub fn check_size(file_name: &str, bytes: &[u8], limit: usize) -> Result<()> {
    if bytes.len() > limit {
        return Err(ImportError::TooLarge {
            size: bytes.len(),
            limit,
        });
    }

    let blank = strip_bom(bytes).iter().all(|b| b.is_ascii_whitespace());
    if blank {
        let message = "empty file".to_string();
        return Err(match extension(file_name).as_deref() {
            Some("gpx") => ImportError::InvalidGpx(message),
            _ => ImportError::InvalidCsv(message),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_wins() {
        assert_eq!(detect_format("route.GPX", b"name,date").unwrap(), ImportFormat::Gpx);
        assert_eq!(detect_format("races.csv", b"<gpx>").unwrap(), ImportFormat::Csv);
    }

    #[test]
    fn test_sniff_gpx_with_bom() {
        let bytes = b"\xEF\xBB\xBF  <?xml version=\"1.0\"?><gpx></gpx>";
        assert_eq!(detect_format("upload", bytes).unwrap(), ImportFormat::Gpx);
    }

    #[test]
    fn test_sniff_csv_delimiters() {
        assert_eq!(detect_format("upload.txt", b"name;date\nA;B").unwrap(), ImportFormat::Csv);
        assert_eq!(detect_format("upload", b"name\tdate").unwrap(), ImportFormat::Csv);
    }

    #[test]
    fn test_unknown_content_rejected() {
        assert!(matches!(
            detect_format("notes.txt", b"just some words"),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_check_size() {
        assert!(matches!(
            check_size("a.csv", &[b'a'; 11], 10),
            Err(ImportError::TooLarge { size: 11, limit: 10 })
        ));
        assert!(matches!(check_size("a.gpx", b"  \n", 10), Err(ImportError::InvalidGpx(_))));
        assert!(matches!(check_size("a.csv", b"", 10), Err(ImportError::InvalidCsv(_))));
        assert!(check_size("a.csv", b"name\nx", 10).is_ok());
    }
}
