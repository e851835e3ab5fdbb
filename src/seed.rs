use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::db::CityInput;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to read seed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse seed list: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Duplicate seed entry for {name}, {country}")]
    Duplicate { name: String, country: String },
}

/// Ordered list of cities to provision, loaded from TOML:
///
/// ```toml
/// [[cities]]
/// name = "Fortaleza"
/// country = "BR"
/// latitude = -3.7172
/// longitude = -38.5433
/// timezone = "America/Fortaleza"
/// active = true
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedList {
    #[serde(default)]
    pub cities: Vec<CityInput>,
}

impl SeedList {
    pub fn from_file(path: &Path) -> Result<Self, SeedError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, SeedError> {
        let seed: SeedList = toml::from_str(contents)?;

        let mut seen = HashSet::new();
        for city in &seed.cities {
            let key = (city.name.trim().to_string(), city.country.trim().to_ascii_uppercase());
            if !seen.insert(key) {
                return Err(SeedError::Duplicate {
                    name: city.name.clone(),
                    country: city.country.clone(),
                });
            }
        }

        Ok(seed)
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CITIES: &str = r#"
        [[cities]]
        name = "Fortaleza"
        country = "BR"
        latitude = -3.7172
        longitude = -38.5433
        timezone = "America/Fortaleza"
        active = true

        [[cities]]
        name = "Recife"
        country = "BR"
        latitude = -8.0476
        longitude = -34.877
        timezone = "America/Recife"
    "#;

    #[test]
    fn test_parse_preserves_order() {
        let seed = SeedList::from_toml_str(TWO_CITIES).unwrap();
        assert_eq!(seed.len(), 2);
        assert_eq!(seed.cities[0].name, "Fortaleza");
        assert_eq!(seed.cities[1].name, "Recife");
    }

    #[test]
    fn test_active_defaults_to_true() {
        let seed = SeedList::from_toml_str(TWO_CITIES).unwrap();
        assert!(seed.cities[1].active);
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let entry = r#"
            [[cities]]
            name = "Recife"
            country = "br"
            latitude = -8.0476
            longitude = -34.877
            timezone = "America/Recife"
        "#;
        let doubled = format!("{TWO_CITIES}\n{entry}");
        let err = SeedList::from_toml_str(&doubled).unwrap_err();
        assert!(matches!(err, SeedError::Duplicate { .. }));
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        let err = SeedList::from_toml_str("[[cities]]\nname = \"Recife\"\n").unwrap_err();
        assert!(matches!(err, SeedError::Parse(_)));
    }

    #[test]
    fn test_empty_document_is_empty_list() {
        assert!(SeedList::from_toml_str("").unwrap().is_empty());
    }

    #[test]
    fn test_bundled_seed_file_has_five_cities() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/cities.toml");
        let seed = SeedList::from_file(&path).unwrap();
        assert_eq!(seed.len(), 5);
        assert_eq!(seed.cities[0].name, "Fortaleza");
    }
}
