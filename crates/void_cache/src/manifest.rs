//! Persisted library manifests
//!
//! A library is a bundle of files downloaded once and kept on disk. Its
//! manifest records where the files live and the server timestamp of the
//! version on disk, so a later session can skip the download when the server
//! has nothing newer.
//!
//! Timestamps are locale-formatted strings. `dateFormat` may be a chrono
//! format (`%d/%m/%Y`) or a .NET-style pattern (`dd/MM/yyyy HH:mm:ss`); when it
//! is empty the culture picks the field order.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// One file shipped in a library
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryFile {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub local_path: String,
    #[serde(default)]
    pub relative_path: String,
}

/// Local descriptor of a downloaded library
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryManifest {
    pub key: String,
    /// Directory holding the library's files
    #[serde(default)]
    pub path: String,
    /// Server timestamp of the version on disk
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub date_format: String,
    #[serde(default)]
    pub culture: String,
    #[serde(default)]
    pub files: Vec<LibraryFile>,
}

impl LibraryManifest {
    pub fn load(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Manifest(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| CacheError::Manifest(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CacheResult<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| CacheError::Manifest(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Manifest(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(path, text)
            .map_err(|e| CacheError::Manifest(format!("{}: {}", path.display(), e)))
    }

    /// Parse a timestamp written in this manifest's format and culture
    pub fn parse_date(&self, value: &str) -> Option<NaiveDateTime> {
        parse_date(value, &self.date_format, &self.culture)
    }

    /// True when the server version is not newer than the one on disk.
    ///
    /// Unparseable dates on either side count as stale.
    pub fn is_up_to_date(&self, server_date: &str) -> bool {
        match (self.parse_date(&self.date), self.parse_date(server_date)) {
            (Some(local), Some(server)) => server <= local,
            _ => false,
        }
    }
}

/// Parse a locale-formatted timestamp
pub fn parse_date(value: &str, date_format: &str, culture: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if !date_format.trim().is_empty() {
        let format = if date_format.contains('%') {
            date_format.to_string()
        } else {
            translate_pattern(date_format)
        };
        return parse_with(value, &format);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    culture_formats(culture)
        .iter()
        .find_map(|format| parse_with(value, format))
}

fn parse_with(value: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn culture_formats(culture: &str) -> &'static [&'static str] {
    let culture = culture.trim().to_ascii_lowercase();
    // The invariant culture is month-first, like en-US
    if culture.is_empty() || culture == "invariant" || culture.starts_with("en") {
        &[
            "%m/%d/%Y %H:%M:%S",
            "%m/%d/%Y %I:%M:%S %p",
            "%m/%d/%Y %H:%M",
            "%m/%d/%Y",
            "%Y-%m-%d %H:%M:%S",
        ]
    } else {
        &[
            "%d/%m/%Y %H:%M:%S",
            "%d.%m.%Y %H:%M:%S",
            "%d-%m-%Y %H:%M:%S",
            "%d/%m/%Y %H:%M",
            "%d.%m.%Y %H:%M",
            "%d/%m/%Y",
            "%d.%m.%Y",
            "%Y-%m-%d %H:%M:%S",
        ]
    }
}

/// Turn a .NET-style date pattern into a chrono format string
fn translate_pattern(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        let token = match (c, run) {
            ('y', 1..=2) => Some("%y"),
            ('y', _) => Some("%Y"),
            ('M', 1..=2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', 1..=2) => Some("%d"),
            ('d', 3) => Some("%a"),
            ('d', _) => Some("%A"),
            ('H', _) => Some("%H"),
            ('h', _) => Some("%I"),
            ('m', _) => Some("%M"),
            ('s', _) => Some("%S"),
            ('t', _) => Some("%p"),
            ('f', _) => Some("%f"),
            _ => None,
        };
        match token {
            Some(token) => out.push_str(token),
            None => {
                for _ in 0..run {
                    if c == '%' {
                        out.push_str("%%");
                    } else {
                        out.push(c);
                    }
                }
            }
        }
        i += run;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(date: &str, format: &str, culture: &str) -> LibraryManifest {
        LibraryManifest {
            key: "lib".into(),
            date: date.into(),
            date_format: format.into(),
            culture: culture.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_translate_pattern() {
        assert_eq!(translate_pattern("dd/MM/yyyy HH:mm:ss"), "%d/%m/%Y %H:%M:%S");
        assert_eq!(translate_pattern("M/d/yyyy h:mm:ss tt"), "%m/%d/%Y %I:%M:%S %p");
    }

    #[test]
    fn test_culture_field_order() {
        let us = parse_date("03/04/2024 10:00:00", "", "en-US").unwrap();
        let fr = parse_date("03/04/2024 10:00:00", "", "fr-FR").unwrap();
        assert_eq!(us.date(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(fr.date(), NaiveDate::from_ymd_opt(2024, 4, 3).unwrap());
    }

    #[test]
    fn test_rfc3339_for_invariant() {
        let dt = parse_date("2024-05-01T12:00:00Z", "", "").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_up_to_date() {
        let m = manifest("15.06.2024 08:30:00", "dd.MM.yyyy HH:mm:ss", "de-DE");
        assert!(m.is_up_to_date("15.06.2024 08:30:00"));
        assert!(m.is_up_to_date("01.01.2024 00:00:00"));
        assert!(!m.is_up_to_date("16.06.2024 00:00:00"));
        assert!(!m.is_up_to_date("not a date"));
        assert!(!manifest("", "", "").is_up_to_date("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_json_field_names() {
        let json = r#"{
            "key": "props", "path": "/libs/props", "date": "06/15/2024",
            "dateFormat": "", "culture": "en-US",
            "files": [{ "url": "https://h/p/a.glb", "localPath": "a.glb", "relativePath": "p/a.glb" }]
        }"#;
        let m: LibraryManifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.files[0].local_path, "a.glb");
        assert!(m.is_up_to_date("06/14/2024"));
    }
}
