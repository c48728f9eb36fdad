//! UUID utilities

use uuid::Uuid;

/// Parse a UUID supplied by a client, mapping failures to `InvalidInput`
pub fn parse(s: &str) -> crate::Result<Uuid> {
    Uuid::parse_str(s.trim())
        .map_err(|e| crate::Error::InvalidInput(format!("Invalid id '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_validates() {
        let id = Uuid::new_v4();
        assert_eq!(parse(&format!(" {} ", id)).unwrap(), id);
        assert!(parse("not-a-uuid").is_err());
    }
}
