use std::path::Path;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_yaml::Value;

use super::{ManualArtist, ManualEntries, ManualEntriesError};

static MBID_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").ok()
});

/// Whether `value` is a hyphenated UUID, ignoring case.
pub fn is_valid_mbid(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    match MBID_PATTERN.as_ref() {
        Some(pattern) => pattern.is_match(&lowered),
        None => false,
    }
}

/// Read and validate the manual entries file.
pub fn load_manual_entries(path: &Path) -> Result<ManualEntries, ManualEntriesError> {
    if !path.exists() {
        return Err(ManualEntriesError::NotFound(path.display().to_string()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| ManualEntriesError::Io(e.to_string()))?;
    parse_manual_entries(&content)
}

/// Parse and validate a YAML declaration.
///
/// Any invalid entry rejects the whole document; every problem found is
/// reported together.
pub fn parse_manual_entries(content: &str) -> Result<ManualEntries, ManualEntriesError> {
    let document: Value =
        serde_yaml::from_str(content).map_err(|e| ManualEntriesError::Yaml(e.to_string()))?;

    let mapping = match document {
        Value::Null => return Ok(ManualEntries::default()),
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(ManualEntriesError::Invalid(vec![
                "document must be a mapping keyed by artist MBID".to_string(),
            ]))
        }
    };

    let mut errors = Vec::new();
    let mut artists = Vec::new();

    for (key, value) in mapping {
        let Some(raw_id) = key.as_str() else {
            errors.push(format!("artist key {:?} is not a string", key));
            continue;
        };
        if !is_valid_mbid(raw_id) {
            errors.push(format!("invalid artist MBID: {}", raw_id));
            continue;
        }
        let id = raw_id.trim().to_ascii_lowercase();

        let Some(fields) = value.as_mapping() else {
            errors.push(format!("artist {}: must be a mapping with a 'name' field", id));
            continue;
        };

        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if name.is_empty() {
            errors.push(format!("artist {}: missing or empty 'name'", id));
            continue;
        }

        let mut release_groups = Vec::new();
        match fields.get("release-groups") {
            None | Some(Value::Null) => {}
            Some(Value::Sequence(items)) => {
                for item in items {
                    match item.as_str() {
                        Some(rg) if is_valid_mbid(rg) => {
                            release_groups.push(rg.trim().to_ascii_lowercase())
                        }
                        _ => errors.push(format!(
                            "artist {}: invalid release group MBID: {:?}",
                            id, item
                        )),
                    }
                }
            }
            Some(_) => {
                errors.push(format!("artist {}: 'release-groups' must be a list", id));
                continue;
            }
        }

        artists.push(ManualArtist {
            id,
            name: name.to_string(),
            release_groups,
        });
    }

    if errors.is_empty() {
        Ok(ManualEntries { artists })
    } else {
        Err(ManualEntriesError::Invalid(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIST: &str = "5b11f4ce-a62d-471e-81fc-a69a8278c7da";
    const RG1: &str = "1b022e01-4da6-387b-8658-8678046e4cef";
    const RG2: &str = "0f2d4e53-1c4b-4a56-9b3a-2f5d6c7e8a9b";

    #[test]
    fn test_mbid_validation() {
        assert!(is_valid_mbid(ARTIST));
        assert!(is_valid_mbid(&ARTIST.to_uppercase()));
        assert!(!is_valid_mbid("not-a-uuid"));
        assert!(!is_valid_mbid("5b11f4cea62d471e81fca69a8278c7da"));
        assert!(!is_valid_mbid(""));
    }

    #[test]
    fn test_parse_valid_document() {
        let yaml = format!(
            "{}:\n  name: \" Nirvana \"\n  release-groups:\n    - {}\n    - {}\n",
            ARTIST.to_uppercase(),
            RG1,
            RG2
        );
        let entries = parse_manual_entries(&yaml).unwrap();
        assert_eq!(entries.artists.len(), 1);
        let artist = &entries.artists[0];
        assert_eq!(artist.id, ARTIST);
        assert_eq!(artist.name, "Nirvana");
        assert_eq!(artist.release_groups, vec![RG1.to_string(), RG2.to_string()]);
        assert_eq!(entries.release_group_count(), 2);
    }

    #[test]
    fn test_parse_artist_without_release_groups() {
        let yaml = format!("{}:\n  name: Solo\n", ARTIST);
        let entries = parse_manual_entries(&yaml).unwrap();
        assert!(entries.artists[0].release_groups.is_empty());
    }

    #[test]
    fn test_parse_empty_document() {
        assert!(parse_manual_entries("").unwrap().is_empty());
    }

    #[test]
    fn test_any_error_rejects_document() {
        let yaml = format!(
            "{}:\n  name: Good\nbad-id:\n  name: Bad\n{}:\n  name: \"\"\n",
            ARTIST, RG1
        );
        let err = parse_manual_entries(&yaml).unwrap_err();
        match err {
            ManualEntriesError::Invalid(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("bad-id"));
                assert!(errors[1].contains("name"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_release_group_list() {
        let yaml = format!("{}:\n  name: X\n  release-groups: nope\n", ARTIST);
        assert!(matches!(
            parse_manual_entries(&yaml),
            Err(ManualEntriesError::Invalid(_))
        ));

        let yaml = format!("{}:\n  name: X\n  release-groups:\n    - short\n", ARTIST);
        assert!(matches!(
            parse_manual_entries(&yaml),
            Err(ManualEntriesError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            parse_manual_entries("key: [unclosed"),
            Err(ManualEntriesError::Yaml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = load_manual_entries(Path::new("/nonexistent/manual.yml"));
        assert!(matches!(result, Err(ManualEntriesError::NotFound(_))));
    }
}
