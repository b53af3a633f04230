//! Configuration for one generation pass. [`Config`] says where things live
//! and how to treat drafts; [`BlogMeta`] is the blog-level metadata read from
//! the optional `META.yaml` file in the posts directory, with defaults for
//! anything it leaves out.

use crate::feed::{site_root, FeedConfig, DEFAULT_PAGE_SIZE};
use chrono::{
    DateTime, FixedOffset, Locale, LocalResult, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use log::info;
use serde::Deserialize;
use std::convert::TryFrom;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

/// The name of the blog metadata file in the posts directory.
pub const META_FILE_NAME: &str = "META.yaml";

/// Namespace for the UUIDs given to blogs that don't declare an `id`.
const NAMESPACE_BLOG: Uuid = Uuid::from_u128(0x30c72114_7908_4a69_84ff_7ed69090220d);

/// Where a generation pass reads from and writes to.
#[derive(Clone, Debug)]
pub struct Config {
    pub posts_directory: PathBuf,
    pub templates_directory: PathBuf,

    /// Copied verbatim into the output directory, if it exists.
    pub static_directory: Option<PathBuf>,
    pub output_directory: PathBuf,

    /// Whether to keep posts that are undated or dated after `now`.
    pub include_drafts: bool,

    /// The publication cut-off. Defaults to the current time.
    pub now: Option<DateTime<FixedOffset>>,

    /// Overrides the feed page size from `META.yaml`.
    pub page_size: Option<usize>,

    /// The locale for month names in templates.
    pub locale: Locale,
}

#[derive(Deserialize)]
struct PageSize(usize);

impl Default for PageSize {
    fn default() -> Self {
        PageSize(DEFAULT_PAGE_SIZE)
    }
}

/// The layout of `META.yaml`.
#[derive(Deserialize, Default)]
struct MetaFile {
    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    title: Option<String>,

    #[serde(default)]
    url: Option<Url>,

    #[serde(default)]
    tz: Option<String>,

    #[serde(default)]
    page_size: PageSize,
}

/// Metadata about the blog as a whole, used for the feed and templates.
#[derive(Clone, Debug, PartialEq)]
pub struct BlogMeta {
    /// The feed id. Defaults to a `urn:uuid:` derived from the absolute posts
    /// directory path.
    pub id: String,

    /// Defaults to the posts directory name, skipping directories called
    /// `posts`.
    pub title: String,

    /// The site's base URL, if known. Its path always ends with `/`.
    pub url: Option<Url>,

    /// Given to timestamps written without an offset. Defaults to UTC.
    pub tz: Zone,

    pub page_size: usize,
}

impl BlogMeta {
    /// Loads metadata for the blog whose posts are in `posts_directory`.
    pub fn from_directory(posts_directory: &Path) -> Result<BlogMeta> {
        let path = posts_directory.join(META_FILE_NAME);
        let file: MetaFile = if path.is_file() {
            let file = File::open(&path).map_err(|err| Error::Open {
                path: path.clone(),
                err,
            })?;
            let meta = serde_yaml::from_reader(file)?;
            info!("loaded metadata from {}", path.display());
            meta
        } else {
            MetaFile::default()
        };

        let absolute = if posts_directory.is_absolute() {
            posts_directory.to_owned()
        } else {
            std::env::current_dir()?.join(posts_directory)
        };

        if file.page_size.0 == 0 {
            return Err(Error::InvalidPageSize);
        }

        Ok(BlogMeta {
            id: match file.id {
                Some(id) if !id.is_empty() => id,
                _ => format!(
                    "urn:uuid:{}",
                    Uuid::new_v5(&NAMESPACE_BLOG, absolute.to_string_lossy().as_bytes())
                ),
            },
            title: match file.title {
                Some(title) if !title.is_empty() => title,
                _ => guess_title(&absolute),
            },
            url: file.url.as_ref().map(site_root),
            tz: match &file.tz {
                Some(tz) => parse_zone(tz)?,
                None => Zone::Fixed(utc()),
            },
            page_size: file.page_size.0,
        })
    }

    /// The feed configuration for this blog. `page_size` overrides the
    /// blog's own page size when given.
    pub fn feed_config(&self, page_size: Option<usize>) -> FeedConfig {
        FeedConfig {
            id: self.id.clone(),
            title: self.title.clone(),
            base_url: self.url.clone(),
            page_size: page_size.unwrap_or(self.page_size),
        }
    }
}

fn guess_title(absolute: &Path) -> String {
    let mut dir = absolute;
    while dir.file_name().map_or(false, |name| name == "posts") {
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }
    match dir.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => String::from("Untitled"),
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// A blog time zone: a fixed UTC offset, or a named IANA zone whose offset
/// depends on the date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Zone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl Zone {
    /// The offset in force at the wall-clock time `local`. Ambiguous times
    /// take the earlier offset.
    pub fn offset_at(&self, local: &NaiveDateTime) -> FixedOffset {
        match self {
            Zone::Fixed(offset) => *offset,
            Zone::Named(tz) => match tz.offset_from_local_datetime(local) {
                LocalResult::Single(offset) | LocalResult::Ambiguous(offset, _) => offset.fix(),
                // skipped over by a forward transition
                LocalResult::None => tz.offset_from_utc_datetime(local).fix(),
            },
        }
    }

    /// The current time in this zone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        let now = Utc::now();
        let offset = match self {
            Zone::Fixed(offset) => *offset,
            Zone::Named(tz) => tz.offset_from_utc_datetime(&now.naive_utc()).fix(),
        };
        now.with_timezone(&offset)
    }
}

/// Parses a `tz` setting: a fixed offset (see [`parse_offset`]) or an IANA
/// zone name such as `Europe/London`.
pub fn parse_zone(s: &str) -> Result<Zone> {
    match parse_offset(s) {
        Ok(offset) => Ok(Zone::Fixed(offset)),
        Err(err) => s.trim().parse::<Tz>().map(Zone::Named).map_err(|_| err),
    }
}

/// Parses a fixed UTC offset: `UTC`, `Z`, `+10:00`, `+1000` or `-05`.
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let invalid = || Error::InvalidTimeZone(s.to_owned());
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return Ok(utc());
    }

    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || !matches!(digits.len(), 2 | 4) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = match digits.len() {
        4 => digits[2..].parse().map_err(|_| invalid())?,
        _ => 0,
    };
    if minutes >= 60 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Parses a locale name such as `fr_FR`. `C` and `POSIX` are the default
/// English names.
pub fn parse_locale(s: &str) -> Result<Locale> {
    let name = s.trim();
    let name = name.split('.').next().unwrap_or(name);
    if name == "C" {
        return Ok(Locale::POSIX);
    }
    Locale::try_from(name).map_err(|_| Error::InvalidLocale(s.to_owned()))
}

/// The result of loading configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading configuration.
#[derive(Debug)]
pub enum Error {
    /// Returned when `META.yaml` exists but can't be opened.
    Open { path: PathBuf, err: std::io::Error },

    /// Returned when `META.yaml` isn't valid.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when `tz` is neither a UTC offset nor a known zone name.
    InvalidTimeZone(String),

    /// Returned when the page size is zero.
    InvalidPageSize,

    /// Returned for an unknown locale name.
    InvalidLocale(String),

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Open { path, err } => {
                write!(f, "Opening metadata file `{}`: {}", path.display(), err)
            }
            Error::DeserializeYaml(err) => {
                write!(f, "Reading `{}`: {}", META_FILE_NAME, err)
            }
            Error::InvalidTimeZone(tz) => write!(
                f,
                "Invalid time zone {:?}: expected an offset like `+10:00` or a name like `Europe/London`",
                tz
            ),
            Error::InvalidPageSize => write!(f, "Page size must be at least 1"),
            Error::InvalidLocale(locale) => write!(f, "Unknown locale {:?}", locale),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Open { err, .. } => Some(err),
            Error::DeserializeYaml(err) => Some(err),
            Error::InvalidTimeZone(_) => None,
            Error::InvalidPageSize => None,
            Error::InvalidLocale(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_guesses_title_and_id() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let bananas = dir.path().join("bananas/posts");
        std::fs::create_dir_all(&bananas)?;
        let damsons = dir.path().join("damsons");
        std::fs::create_dir(&damsons)?;

        let first = BlogMeta::from_directory(&bananas)?;
        let second = BlogMeta::from_directory(&damsons)?;
        let again = BlogMeta::from_directory(&bananas)?;

        assert_eq!(first.title, "bananas");
        assert_eq!(second.title, "damsons");
        assert!(first.id.starts_with("urn:uuid:"));
        assert_ne!(first.id, second.id);
        assert_eq!(first.id, again.id);
        assert_eq!(first.tz, Zone::Fixed(utc()));
        assert_eq!(first.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(first.url, None);
        Ok(())
    }

    #[test]
    fn test_relative_directory_still_gets_title() -> Result<()> {
        let meta = BlogMeta::from_directory(Path::new("posts"))?;
        assert!(!meta.title.is_empty());
        Ok(())
    }

    #[test]
    fn test_reads_meta_yaml() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join(META_FILE_NAME),
            "id: tag:dewinter.example,2024:alice\n\
             title: Alice’s Awesome Blog\n\
             url: https://dewinter.example/alice/\n\
             tz: '+10:00'\n\
             page_size: 5\n",
        )?;

        let meta = BlogMeta::from_directory(dir.path())?;
        assert_eq!(meta.id, "tag:dewinter.example,2024:alice");
        assert_eq!(meta.title, "Alice’s Awesome Blog");
        assert_eq!(meta.url.as_ref().map(Url::as_str), Some("https://dewinter.example/alice/"));
        assert_eq!(meta.tz, Zone::Fixed(FixedOffset::east_opt(10 * 3600).unwrap()));
        assert_eq!(meta.page_size, 5);

        let feed = meta.feed_config(Some(20));
        assert_eq!(feed.page_size, 20);
        assert_eq!(feed.id, meta.id);
        Ok(())
    }

    #[test]
    fn test_base_url_gets_trailing_slash() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(META_FILE_NAME), "url: https://example.org/blog\n")?;
        let meta = BlogMeta::from_directory(dir.path())?;
        assert_eq!(meta.url.as_ref().map(Url::as_str), Some("https://example.org/blog/"));
        Ok(())
    }

    #[test]
    fn test_named_time_zones() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(META_FILE_NAME), "tz: Europe/London\n")?;
        let meta = BlogMeta::from_directory(dir.path())?;
        assert_eq!(meta.tz, Zone::Named(chrono_tz::Europe::London));

        std::fs::write(dir.path().join(META_FILE_NAME), "tz: Mars/Olympus_Mons\n")?;
        assert!(matches!(
            BlogMeta::from_directory(dir.path()),
            Err(Error::InvalidTimeZone(_))
        ));
        Ok(())
    }

    #[test]
    fn test_named_zone_offset_follows_the_date() -> Result<()> {
        let london = parse_zone("Europe/London")?;
        let at = |y, m, d, h| {
            chrono::NaiveDate::from_ymd_opt(y, m, d)
                .and_then(|date| date.and_hms_opt(h, 0, 0))
                .unwrap()
        };
        assert_eq!(london.offset_at(&at(2024, 1, 15, 12)).local_minus_utc(), 0);
        assert_eq!(london.offset_at(&at(2024, 7, 1, 12)).local_minus_utc(), 3600);
        // 01:00 happens twice on 2024-10-27; the first is still summer time.
        assert_eq!(london.offset_at(&at(2024, 10, 27, 1)).local_minus_utc(), 3600);

        assert_eq!(parse_zone("+10:00")?, Zone::Fixed(parse_offset("+10:00")?));
        assert_eq!(parse_zone("UTC")?, Zone::Fixed(utc()));
        Ok(())
    }

    #[test]
    fn test_rejects_zero_page_size() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(META_FILE_NAME), "page_size: 0\n")?;
        assert!(matches!(
            BlogMeta::from_directory(dir.path()),
            Err(Error::InvalidPageSize)
        ));
        Ok(())
    }

    #[test]
    fn test_parse_locale() -> Result<()> {
        assert_eq!(parse_locale("fr_FR")?, Locale::fr_FR);
        assert_eq!(parse_locale("de_DE.UTF-8")?, Locale::de_DE);
        assert_eq!(parse_locale("C")?, Locale::POSIX);
        assert_eq!(parse_locale("POSIX")?, Locale::POSIX);
        assert!(matches!(parse_locale("xx_YY"), Err(Error::InvalidLocale(_))));
        Ok(())
    }

    #[test]
    fn test_parse_offset() -> Result<()> {
        assert_eq!(parse_offset("UTC")?, utc());
        assert_eq!(parse_offset("Z")?, utc());
        assert_eq!(parse_offset("+10:00")?.local_minus_utc(), 36000);
        assert_eq!(parse_offset("-0530")?.local_minus_utc(), -19800);
        assert_eq!(parse_offset("+02")?.local_minus_utc(), 7200);
        assert!(parse_offset("10:00").is_err());
        assert!(parse_offset("+1:00").is_err());
        assert!(parse_offset("+10:75").is_err());
        Ok(())
    }
}
