//! Filename stamping and parsing.
//!
//! A stamped file name has the shape
//!
//! ```text
//! <base><date-format>[-<millis:03>][_(<version>)].<extension>
//! ```
//!
//! The stamper renders creation time and version into that shape and the
//! parser recovers them from an existing name. Parsing never fails: segments
//! that are missing or malformed come back as explicit sentinel values so a
//! directory scan can tolerate unrelated files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};
use parking_lot::Mutex;

use crate::error::{Result, RollError};

/// Default date-time format appended after the base name.
pub const DEFAULT_DATE_FORMAT: &str = "_%Y-%m-%d_%H-%M-%S";

/// Pause taken under the stamper lock after reading the clock, so two racing
/// callers never observe the same millisecond.
const STAMP_DELAY: Duration = Duration::from_millis(2);

/// Version segment recovered from a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StampVersion {
    /// The name carries no trailing `)`.
    #[default]
    Absent,
    /// The name ends in `)` but no `(<digits>` precedes it.
    Malformed,
    /// A well-formed version number.
    Number(u32),
}

impl StampVersion {
    /// Returns the version number if one was parsed.
    #[must_use]
    pub const fn number(self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(n),
            Self::Absent | Self::Malformed => None,
        }
    }

    /// Returns true if no version segment is present.
    #[must_use]
    pub const fn is_absent(self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Display for StampVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "none"),
            Self::Malformed => write!(f, "malformed"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Creation time and version encoded in a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStamp {
    /// Creation instant, `None` if the date segment could not be read.
    pub created: Option<DateTime<Utc>>,
    /// Version segment.
    pub version: StampVersion,
}

/// Encodes and decodes file stamps.
pub trait FileStamper: Send + Sync + fmt::Debug {
    /// Stamps `base` (a path without extension) with the current time.
    ///
    /// When `version` is `None` the stamper may fall back to a version it was
    /// configured with.
    fn stamp(&self, base: &Path, version: Option<u32>) -> PathBuf;

    /// Stamps `base` with an explicit instant.
    fn stamp_at(&self, base: &Path, at: DateTime<Utc>, version: Option<u32>) -> PathBuf;

    /// Recovers the stamp from `path` (without extension), given the base
    /// file name that precedes the date segment.
    fn parse(&self, base_name: &str, path: &Path) -> FileStamp;
}

/// Default [`FileStamper`] using a chrono strftime format.
#[derive(Debug)]
pub struct DateStamper {
    format: String,
    include_millis: bool,
    version: Option<u32>,
    width: usize,
    clock: Mutex<()>,
}

impl Default for DateStamper {
    fn default() -> Self {
        Self {
            format: DEFAULT_DATE_FORMAT.to_string(),
            include_millis: true,
            version: None,
            width: DEFAULT_DATE_FORMAT_WIDTH,
            clock: Mutex::new(()),
        }
    }
}

// "_2001-01-01_01-01-01"
const DEFAULT_DATE_FORMAT_WIDTH: usize = 20;

impl DateStamper {
    /// Creates a stamper with the given date format.
    ///
    /// # Errors
    ///
    /// Returns [`RollError::Configuration`] if the format is not a valid
    /// strftime string, renders a variable width, or cannot be parsed back.
    pub fn new(format: impl Into<String>, include_millis: bool) -> Result<Self> {
        let format = format.into();
        let width = validate_format(&format)?;
        Ok(Self {
            format,
            include_millis,
            version: None,
            width,
            clock: Mutex::new(()),
        })
    }

    /// Sets the version used when a stamp call passes none.
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Returns the date format.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Returns true if a millisecond segment is written.
    #[must_use]
    pub const fn include_millis(&self) -> bool {
        self.include_millis
    }

    /// Truncates `at` to the precision this stamper records.
    #[must_use]
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let nanos = if self.include_millis {
            millis_of(at) * 1_000_000
        } else {
            0
        };
        at.with_nanosecond(nanos).unwrap_or(at)
    }

    fn parse_created(&self, base_name: &str, stem: &str) -> Option<DateTime<Utc>> {
        let offset = stem.find(base_name)? + base_name.len();
        let rest = stem.get(offset..)?;
        let date = rest.get(..self.width)?;
        let naive = NaiveDateTime::parse_from_str(date, &self.format)
            .or_else(|_| {
                NaiveDate::parse_from_str(date, &self.format)
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
            .ok()?;
        let mut created = Utc.from_utc_datetime(&naive);

        if self.include_millis {
            let millis = rest
                .get(self.width..)
                .and_then(|tail| tail.strip_prefix('-'))
                .and_then(|tail| tail.get(..3))
                .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|digits| digits.parse::<i64>().ok());
            if let Some(millis) = millis {
                created += TimeDelta::milliseconds(millis);
            }
        }
        Some(created)
    }
}

impl FileStamper for DateStamper {
    fn stamp(&self, base: &Path, version: Option<u32>) -> PathBuf {
        let at = {
            let _clock = self.clock.lock();
            let now = Utc::now();
            thread::sleep(STAMP_DELAY);
            now
        };
        self.stamp_at(base, at, version)
    }

    fn stamp_at(&self, base: &Path, at: DateTime<Utc>, version: Option<u32>) -> PathBuf {
        let mut name = base.as_os_str().to_owned();
        name.push(at.format(&self.format).to_string());
        if self.include_millis {
            name.push(format!("-{:03}", millis_of(at)));
        }
        if let Some(version) = version.or(self.version) {
            name.push(format!("_({version})"));
        }
        PathBuf::from(name)
    }

    fn parse(&self, base_name: &str, path: &Path) -> FileStamp {
        let Some(stem) = path.file_name().and_then(|n| n.to_str()) else {
            return FileStamp::default();
        };
        FileStamp {
            created: self.parse_created(base_name, stem),
            version: parse_version(stem),
        }
    }
}

/// Reads a trailing `(<digits>)` segment.
#[must_use]
pub fn parse_version(stem: &str) -> StampVersion {
    let Some(inner) = stem.strip_suffix(')') else {
        return StampVersion::Absent;
    };
    let prefix = inner.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &inner[prefix.len()..];
    if digits.is_empty() || !prefix.ends_with('(') {
        return StampVersion::Malformed;
    }
    digits
        .parse::<u32>()
        .map_or(StampVersion::Malformed, StampVersion::Number)
}

// Leap seconds report 1000..=1999.
fn millis_of(at: DateTime<Utc>) -> u32 {
    at.timestamp_subsec_millis().min(999)
}

fn validate_format(format: &str) -> Result<usize> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(RollError::Configuration(format!(
            "invalid date format: {format:?}"
        )));
    }

    let early = Utc.with_ymd_and_hms(2001, 1, 1, 1, 1, 1).single();
    let late = Utc.with_ymd_and_hms(2099, 12, 28, 23, 59, 59).single();
    let (Some(early), Some(late)) = (early, late) else {
        return Err(RollError::Configuration("reference dates".to_string()));
    };
    let early = early.format(format).to_string();
    let late = late.format(format).to_string();
    if early.len() != late.len() {
        return Err(RollError::Configuration(format!(
            "date format {format:?} does not render a fixed width"
        )));
    }

    let parses = NaiveDateTime::parse_from_str(&late, format).is_ok()
        || NaiveDate::parse_from_str(&late, format).is_ok();
    if !parses {
        return Err(RollError::Configuration(format!(
            "date format {format:?} cannot be parsed back into a date"
        )));
    }
    Ok(early.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .map(|t| t + TimeDelta::milliseconds(i64::from(ms)))
            .expect("valid date")
    }

    #[test]
    fn default_width_matches_format() {
        assert_eq!(
            validate_format(DEFAULT_DATE_FORMAT).expect("valid"),
            DEFAULT_DATE_FORMAT_WIDTH
        );
    }

    #[test]
    fn stamp_renders_grammar() {
        let stamper = DateStamper::default();
        let t = at(2024, 3, 9, 14, 5, 7, 42);

        let path = stamper.stamp_at(Path::new("/logs/app"), t, Some(3));
        assert_eq!(path, PathBuf::from("/logs/app_2024-03-09_14-05-07-042_(3)"));

        let path = stamper.stamp_at(Path::new("/logs/app"), t, None);
        assert_eq!(path, PathBuf::from("/logs/app_2024-03-09_14-05-07-042"));
    }

    #[test]
    fn stamp_without_millis() {
        let stamper = DateStamper::new(DEFAULT_DATE_FORMAT, false).expect("stamper");
        let path = stamper.stamp_at(Path::new("app"), at(2024, 3, 9, 14, 5, 7, 42), None);
        assert_eq!(path, PathBuf::from("app_2024-03-09_14-05-07"));
    }

    #[test]
    fn configured_version_used_when_none_given() {
        let stamper = DateStamper::default().with_version(7);
        let t = at(2024, 1, 1, 0, 0, 0, 0);

        let path = stamper.stamp_at(Path::new("app"), t, None);
        assert!(path.to_string_lossy().ends_with("_(7)"));

        let path = stamper.stamp_at(Path::new("app"), t, Some(2));
        assert!(path.to_string_lossy().ends_with("_(2)"));
    }

    #[test]
    fn parse_recovers_stamp() {
        let stamper = DateStamper::default();
        let t = at(2024, 3, 9, 14, 5, 7, 42);
        let path = stamper.stamp_at(Path::new("/logs/app"), t, Some(12));

        let stamp = stamper.parse("app", &path);
        assert_eq!(stamp.created, Some(t));
        assert_eq!(stamp.version, StampVersion::Number(12));
    }

    #[test]
    fn parse_without_version_is_absent() {
        let stamper = DateStamper::default();
        let stamp = stamper.parse("app", Path::new("app_2024-03-09_14-05-07-042"));
        assert!(stamp.version.is_absent());
        assert!(stamp.created.is_some());
    }

    #[test]
    fn parse_unrelated_name_degrades() {
        let stamper = DateStamper::default();
        let stamp = stamper.parse("app", Path::new("/logs/readme"));
        assert_eq!(stamp, FileStamp::default());

        let stamp = stamper.parse("app", Path::new("/logs/app_garbage_here_(x)"));
        assert!(stamp.created.is_none());
        assert_eq!(stamp.version, StampVersion::Malformed);
    }

    #[test]
    fn parse_tolerates_missing_millis() {
        let stamper = DateStamper::default();
        let stamp = stamper.parse("app", Path::new("app_2024-03-09_14-05-07_(1)"));
        assert_eq!(stamp.created, Some(at(2024, 3, 9, 14, 5, 7, 0)));
        assert_eq!(stamp.version, StampVersion::Number(1));
    }

    #[test_case("app_(4)", StampVersion::Number(4) ; "plain number")]
    #[test_case("app_(0)", StampVersion::Number(0) ; "zero")]
    #[test_case("app_(123456)", StampVersion::Number(123_456) ; "large number")]
    #[test_case("app", StampVersion::Absent ; "no suffix")]
    #[test_case("app_(4", StampVersion::Absent ; "unclosed")]
    #[test_case("app)", StampVersion::Malformed ; "close only")]
    #[test_case("app_()", StampVersion::Malformed ; "empty parens")]
    #[test_case("app_(x)", StampVersion::Malformed ; "not a number")]
    #[test_case("app_(-1)", StampVersion::Malformed ; "negative")]
    #[test_case("app_4)", StampVersion::Malformed ; "missing open paren")]
    #[test_case("app_(99999999999)", StampVersion::Malformed ; "overflow")]
    fn version_suffix(stem: &str, expected: StampVersion) {
        assert_eq!(parse_version(stem), expected);
    }

    #[test]
    fn stamp_serializes_concurrent_callers() {
        let stamper = std::sync::Arc::new(DateStamper::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stamper = std::sync::Arc::clone(&stamper);
                thread::spawn(move || {
                    (0..5)
                        .map(|_| stamper.stamp(Path::new("app"), None))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut names: Vec<PathBuf> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("join"))
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn truncate_to_precision() {
        let t = at(2024, 3, 9, 14, 5, 7, 42) + TimeDelta::microseconds(321);
        let with_ms = DateStamper::default();
        let without_ms = DateStamper::new(DEFAULT_DATE_FORMAT, false).expect("stamper");

        assert_eq!(with_ms.truncate(t), at(2024, 3, 9, 14, 5, 7, 42));
        assert_eq!(without_ms.truncate(t), at(2024, 3, 9, 14, 5, 7, 0));
    }

    #[test_case("%Q" ; "unknown specifier")]
    #[test_case("_%B_%Y" ; "variable width month name")]
    #[test_case("_%H-%M" ; "no date")]
    fn invalid_formats_rejected(format: &str) {
        let result = DateStamper::new(format, true);
        assert!(matches!(result, Err(RollError::Configuration(_))));
    }

    #[test]
    fn date_only_format_parses_to_midnight() {
        let stamper = DateStamper::new("-%Y%m%d", false).expect("stamper");
        let path = stamper.stamp_at(Path::new("app"), at(2024, 3, 9, 14, 5, 7, 0), Some(1));
        assert_eq!(path, PathBuf::from("app-20240309_(1)"));

        let stamp = stamper.parse("app", &path);
        assert_eq!(stamp.created, Some(at(2024, 3, 9, 0, 0, 0, 0)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn stamp_parse_roundtrip(
                secs in 0i64..4_102_444_800,
                nanos in 0u32..1_000_000_000,
                version in any::<u32>(),
                millis in any::<bool>(),
            ) {
                let stamper = DateStamper::new(DEFAULT_DATE_FORMAT, millis).expect("stamper");
                let t = Utc.timestamp_opt(secs, nanos).single().expect("valid instant");
                let path = stamper.stamp_at(Path::new("/data/app"), t, Some(version));

                let stamp = stamper.parse("app", &path);
                prop_assert_eq!(stamp.version, StampVersion::Number(version));
                prop_assert_eq!(stamp.created, Some(stamper.truncate(t)));
            }
        }
    }
}
