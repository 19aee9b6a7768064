//! Maps preview audio files to the playback roles of a theme.
//!
//! Files are named `<THEME>_<ROLE>-<Title>.m4a`, e.g. `WARM_OPEN-FirstLight.m4a`,
//! plus one `<THEME>_Sonare.m4a` beacon per theme.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use std::fs::FileType;
use std::io;
use std::path::Path;
use tracing::debug;

const AUDIO_EXTENSION: &str = "m4a";
const BEACON_TOKEN: &str = "SONARE";
const URL_PREFIX: &str = "/music/";

// Checked in this order.
const ROLE_PREFIXES: &[(&str, TrackRole)] = &[
    ("OPEN-", TrackRole::Open),
    ("PEAK-", TrackRole::Peak),
    ("OFFPEAK-", TrackRole::Offpeak),
    ("CLOSE-", TrackRole::Close),
];

// Path segment escaping: sub-delims that are legal in a segment stay as-is.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackRole {
    Open,
    Peak,
    Offpeak,
    Close,
    Beacon,
}

impl TrackRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Peak => "peak",
            Self::Offpeak => "offpeak",
            Self::Close => "close",
            Self::Beacon => "beacon",
        }
    }
}

/// Preview URL per role for one theme; unfilled roles are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviewCatalog {
    pub open: String,
    pub peak: String,
    pub offpeak: String,
    pub close: String,
    pub beacon: String,
}

impl PreviewCatalog {
    pub fn get(&self, role: TrackRole) -> &str {
        match role {
            TrackRole::Open => &self.open,
            TrackRole::Peak => &self.peak,
            TrackRole::Offpeak => &self.offpeak,
            TrackRole::Close => &self.close,
            TrackRole::Beacon => &self.beacon,
        }
    }

    fn set(&mut self, role: TrackRole, url: String) {
        let slot = match role {
            TrackRole::Open => &mut self.open,
            TrackRole::Peak => &mut self.peak,
            TrackRole::Offpeak => &mut self.offpeak,
            TrackRole::Close => &mut self.close,
            TrackRole::Beacon => &mut self.beacon,
        };
        *slot = url;
    }

    pub fn is_empty(&self) -> bool {
        [&self.open, &self.peak, &self.offpeak, &self.close, &self.beacon]
            .iter()
            .all(|url| url.is_empty())
    }
}

pub fn normalize_theme(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Splits a preview filename into its normalized theme and role.
///
/// Returns `None` for anything that is not a recognised preview track.
pub fn parse_track_filename(filename: &str) -> Option<(String, TrackRole)> {
    let (base, extension) = filename.rsplit_once('.')?;
    if !extension.eq_ignore_ascii_case(AUDIO_EXTENSION) {
        return None;
    }

    let (theme, remainder) = base.split_once('_')?;
    let theme = normalize_theme(theme);
    if theme.is_empty() {
        return None;
    }

    let remainder = remainder.to_uppercase();
    if remainder == BEACON_TOKEN {
        return Some((theme, TrackRole::Beacon));
    }

    ROLE_PREFIXES
        .iter()
        .find(|(prefix, _)| remainder.starts_with(prefix))
        .map(|&(_, role)| (theme, role))
}

/// Builds the catalog for `theme` from a directory listing.
///
/// When several files map to the same role the last one in `filenames`
/// wins; callers feeding a directory listing get the platform's iteration
/// order.
pub fn resolve<I, S>(filenames: I, theme: &str) -> PreviewCatalog
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let theme = normalize_theme(theme);
    let mut catalog = PreviewCatalog::default();

    for filename in filenames {
        let filename = filename.as_ref();
        match parse_track_filename(filename) {
            Some((track_theme, role)) if track_theme == theme => {
                catalog.set(role, track_url(filename));
            }
            _ => continue,
        }
    }

    catalog
}

/// Lists `dir` and resolves the catalog for `theme`. Subdirectories are ignored.
pub async fn catalog_for_dir(dir: &Path, theme: &str) -> io::Result<PreviewCatalog> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut filenames = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !is_track_candidate(&entry.file_type().await) {
            debug!(name = ?entry.file_name(), "Skipping preview entry");
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => filenames.push(name),
            Err(name) => debug!(?name, "Skipping non UTF-8 preview filename"),
        }
    }

    Ok(resolve(filenames, theme))
}

// Unreadable entries are skipped rather than failing the whole listing.
fn is_track_candidate(file_type: &io::Result<FileType>) -> bool {
    matches!(file_type, Ok(kind) if !kind.is_dir())
}

fn track_url(filename: &str) -> String {
    format!("{URL_PREFIX}{}", utf8_percent_encode(filename, SEGMENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &[&str] = &[
        "WARM_OPEN-FirstLight.m4a",
        "WARM_PEAK-CoreFlow.m4a",
        "WARM_OFFPEAK-DriftState.m4a",
        "WARM_CLOSE-LastCall.m4a",
        "WARM_Sonare.m4a",
        "MODERN_Sonare.m4a",
        "README.txt",
    ];

    #[test]
    fn parses_track_filenames() {
        let cases = [
            ("WARM_OPEN-FirstLight.m4a", Some(("warm", TrackRole::Open))),
            ("modern_sonare.m4a", Some(("modern", TrackRole::Beacon))),
            ("PREMIUM_OFFPEAK-DriftState.M4A", Some(("premium", TrackRole::Offpeak))),
            ("WARM_CLOSE-LastCall.m4a", Some(("warm", TrackRole::Close))),
            ("WARM_OPEN-FirstLight.mp3", None),
            ("WARMOPEN-FirstLight.m4a", None),
            ("WARM_TRANSITION-Rise.m4a", None),
            ("WARM_OPEN.m4a", None),
            ("_OPEN-NoTheme.m4a", None),
            ("WARM_Sonare-Extended.m4a", None),
            ("m4a", None),
        ];

        for (filename, expected) in cases {
            let got = parse_track_filename(filename);
            let expected = expected.map(|(theme, role)| (theme.to_string(), role));
            assert_eq!(got, expected, "filename {filename}");
        }
    }

    #[test]
    fn resolves_full_theme() {
        let catalog = resolve(LISTING, "warm");
        assert_eq!(
            catalog,
            PreviewCatalog {
                open: "/music/WARM_OPEN-FirstLight.m4a".into(),
                peak: "/music/WARM_PEAK-CoreFlow.m4a".into(),
                offpeak: "/music/WARM_OFFPEAK-DriftState.m4a".into(),
                close: "/music/WARM_CLOSE-LastCall.m4a".into(),
                beacon: "/music/WARM_Sonare.m4a".into(),
            }
        );
    }

    #[test]
    fn unknown_theme_yields_empty_catalog() {
        let catalog = resolve(LISTING, "unknown");
        assert_eq!(catalog, PreviewCatalog::default());
        assert!(catalog.is_empty());
    }

    #[test]
    fn requested_theme_is_normalized() {
        let catalog = resolve(LISTING, "  Modern ");
        assert_eq!(catalog.get(TrackRole::Beacon), "/music/MODERN_Sonare.m4a");
        assert_eq!(catalog.get(TrackRole::Open), "");
    }

    #[test]
    fn last_matching_file_wins() {
        let catalog = resolve(["WARM_OPEN-First.m4a", "WARM_OPEN-Second.m4a"], "warm");
        assert_eq!(catalog.open, "/music/WARM_OPEN-Second.m4a");
    }

    #[test]
    fn urls_are_path_escaped() {
        let catalog = resolve(["Warm_PEAK-Core Flow #2.m4a"], "warm");
        assert_eq!(catalog.peak, "/music/Warm_PEAK-Core%20Flow%20%232.m4a");
    }

    #[test]
    fn serializes_with_role_keys() {
        let value = serde_json::to_value(resolve(LISTING, "modern")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "open": "",
                "peak": "",
                "offpeak": "",
                "close": "",
                "beacon": "/music/MODERN_Sonare.m4a",
            })
        );
    }

    #[test]
    fn unreadable_and_directory_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("WARM_Sonare.m4a");
        std::fs::write(&file, "x").unwrap();

        let file_type = std::fs::metadata(&file).map(|m| m.file_type());
        let dir_type = std::fs::metadata(dir.path()).map(|m| m.file_type());
        let unreadable = Err(io::Error::from(io::ErrorKind::PermissionDenied));

        assert!(is_track_candidate(&file_type));
        assert!(!is_track_candidate(&dir_type));
        assert!(!is_track_candidate(&unreadable));
    }

    #[tokio::test]
    async fn catalog_for_dir_reads_listing() {
        let dir = tempfile::tempdir().unwrap();
        for name in LISTING {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("WARM_OPEN-Directory.m4a")).unwrap();
        std::fs::remove_file(dir.path().join("WARM_OPEN-FirstLight.m4a")).unwrap();

        let catalog = catalog_for_dir(dir.path(), "warm").await.unwrap();
        assert_eq!(catalog.open, "");
        assert_eq!(catalog.beacon, "/music/WARM_Sonare.m4a");
        assert_eq!(catalog.close, "/music/WARM_CLOSE-LastCall.m4a");
    }

    #[tokio::test]
    async fn catalog_for_missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(catalog_for_dir(&dir.path().join("music"), "warm").await.is_err());
    }
}
