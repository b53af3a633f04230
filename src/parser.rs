//! Defines the [`Parser`] type, which loads [`Post`] objects from a
//! directory of Markdown files, and the [`Error`] type for the ways that can
//! fail.

use std::{
    fmt,
    fs,
    path::{Component, Path, PathBuf},
};

use chrono::{DateTime, FixedOffset, NaiveDate};
use log::{debug, info};
use walkdir::WalkDir;

use crate::config::Zone;
use crate::post::{Meta, Post, Timestamp};

/// The extension of post source files.
const MARKDOWN_EXTENSION: &str = "markdown";

/// Parses [`Post`] objects from source files.
pub struct Parser {
    /// Given to timestamps written without an offset, at the offset in
    /// force on their own date.
    tz: Zone,

    /// Whether posts that aren't published yet are kept (flagged as drafts)
    /// or skipped.
    include_drafts: bool,

    /// Posts published after this are drafts.
    now: DateTime<FixedOffset>,
}

impl Parser {
    /// Constructs a new parser. See fields on [`Parser`] for argument
    /// descriptions.
    pub fn new(
        tz: Zone,
        include_drafts: bool,
        now: DateTime<FixedOffset>,
    ) -> Parser {
        Parser {
            tz,
            include_drafts,
            now,
        }
    }

    /// Searches `source_directory` recursively for post files (extension =
    /// `.markdown`) and returns the published ones, ordered by path. Each
    /// post file is YAML metadata, a blank line, then the Markdown body:
    ///
    /// ```md
    /// title: Hello, world!
    /// published: 2021-04-16 09:00:00+10:00
    /// tags: [greet]
    ///
    /// # Hello
    ///
    /// World
    /// ```
    pub fn parse_posts(&self, source_directory: &Path) -> Result<Vec<Post>> {
        let mut sources = Vec::new();
        for result in WalkDir::new(source_directory) {
            let entry = result?;
            if entry.file_type().is_file()
                && entry.path().extension().map_or(false, |ext| ext == MARKDOWN_EXTENSION)
            {
                let relative = entry
                    .path()
                    .strip_prefix(source_directory)
                    .map_err(|_| Error::InvalidFileName(entry.path().to_owned()))?;
                sources.push(relative.to_owned());
            }
        }
        sources.sort();

        let mut posts = Vec::with_capacity(sources.len());
        for relative_path in &sources {
            if let Some(post) = self.parse_file(source_directory, relative_path)? {
                posts.push(post);
            }
        }
        info!(
            "loaded {} of {} post(s) from {}",
            posts.len(),
            sources.len(),
            source_directory.display()
        );
        Ok(posts)
    }

    fn parse_file(
        &self,
        source_directory: &Path,
        relative_path: &Path,
    ) -> Result<Option<Post>> {
        let annotate = |err| {
            Error::Annotated(
                format!("parsing post `{}`", relative_path.display()),
                Box::new(err),
            )
        };
        let name = post_name(relative_path).map_err(annotate)?;
        let text = fs::read_to_string(source_directory.join(relative_path))
            .map_err(|err| annotate(Error::Io(err)))?;
        let mut post = self.parse_post(&name, &text).map_err(annotate)?;

        let published = post.meta.published.and_then(|ts| ts.zoned());
        if published.map_or(true, |published| published > self.now) {
            if !self.include_drafts {
                debug!("skipping unpublished post {}", name);
                return Ok(None);
            }
            post.meta.draft = true;
        }
        Ok(Some(post))
    }

    /// Parses a single [`Post`] from a `name` and the source `text`. If the
    /// metadata has no `published` date and the name starts with one (as in
    /// `2024-05-19-hello`), the post is published at midnight on that day.
    /// Timestamps without an offset are given the parser's time zone.
    pub fn parse_post(&self, name: &str, text: &str) -> Result<Post> {
        let (yaml, body) = split_meta(text).ok_or(Error::MissingBlankLine)?;
        let mut meta: Meta = serde_yaml::from_str(yaml)?;

        if meta.published.is_none() {
            meta.published = date_from_name(name).map(Timestamp::from);
        }
        meta.published = meta.published.map(|ts| self.localize(ts));
        meta.updated = meta.updated.map(|ts| self.localize(ts));

        Ok(Post::new(name, meta, body))
    }

    fn localize(&self, ts: Timestamp) -> Timestamp {
        ts.with_offset(self.tz.offset_at(&ts.local()))
    }
}

/// Splits source text at its first blank line. Trailing space on the
/// metadata and any further blank lines before the body are dropped.
fn split_meta(text: &str) -> Option<(&str, &str)> {
    let is_blank = |line: &str| line.ends_with('\n') && line.trim().is_empty();
    let mut line_start = 0;
    for line in text.split_inclusive('\n') {
        let line_end = line_start + line.len();
        if line_start > 0 && is_blank(line) {
            let mut body_start = line_end;
            for next in text[line_end..].split_inclusive('\n') {
                if !is_blank(next) {
                    break;
                }
                body_start += next.len();
            }
            return Some((text[..line_start].trim_end(), &text[body_start..]));
        }
        line_start = line_end;
    }
    None
}

/// The date at the start of a post name like `2024-05-19-hello`.
fn date_from_name(name: &str) -> Option<NaiveDate> {
    let prefix = name.get(..10)?;
    if !prefix.starts_with("20") {
        return None;
    }
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// The slash-separated post name for a source path: the path relative to
/// the posts directory without its extension.
fn post_name(relative_path: &Path) -> Result<String> {
    let invalid = || Error::InvalidFileName(relative_path.to_owned());
    let stem = relative_path.with_extension("");
    let mut parts = Vec::new();
    for component in stem.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
            _ => return Err(invalid()),
        }
    }
    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}

/// Represents the result of a [`Post`]-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a [`Post`] object.
#[derive(Debug)]
pub enum Error {
    /// Returned when a post source file has no blank line separating its
    /// metadata from its body.
    MissingBlankLine,

    /// Returned when there was an error parsing the metadata as YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned for other I/O errors.
    Io(std::io::Error),

    /// Returned for WalkDir I/O errors.
    WalkDir(walkdir::Error),

    /// Returned when a source path can't be turned into a post name.
    InvalidFileName(PathBuf),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingBlankLine => write!(
                f,
                "Expected metadata and body separated by a blank line"
            ),
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::WalkDir(err) => err.fmt(f),
            Error::InvalidFileName(path) => {
                write!(f, "invalid file name: {:?}", path)
            }
            Error::Annotated(annotation, err) => {
                write!(f, "{}: {}", &annotation, err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MissingBlankLine => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::InvalidFileName(_) => None,
            Error::Annotated(_, err) => Some(err),
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

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator while walking the posts directory.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    fn parser(include_drafts: bool) -> Parser {
        Parser::new(
            Zone::Fixed(offset(0)),
            include_drafts,
            offset(0).with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        )
    }

    fn write(dir: &Path, relative_path: &str, text: &str) -> Result<()> {
        let path = dir.join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }

    #[test]
    fn test_splits_meta_and_body() -> Result<()> {
        let post = parser(false).parse_post("hello", "title: Hello\n\nHello, world.\n")?;
        assert_eq!(post.name, "hello");
        assert_eq!(post.meta.title, "Hello");
        assert_eq!(post.body, "Hello, world.\n");
        Ok(())
    }

    #[test]
    fn test_blank_line_may_hold_spaces() -> Result<()> {
        let post = parser(false)
            .parse_post("code", "title: Code   \n   \n\n    let x = 1;\n")?;
        assert_eq!(post.meta.title, "Code");
        assert_eq!(post.body, "    let x = 1;\n");
        Ok(())
    }

    #[test]
    fn test_missing_blank_line() {
        assert!(matches!(
            parser(false).parse_post("hello", "title: Hello\nHello, world.\n"),
            Err(Error::MissingBlankLine)
        ));
    }

    #[test]
    fn test_takes_published_from_name() -> Result<()> {
        let parser = Parser::new(
            Zone::Fixed(offset(10)),
            false,
            offset(10).with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );
        let post = parser.parse_post("2024-05-05-quince", "title: Quince\n\nQuince.\n")?;
        assert_eq!(
            post.meta.published,
            Some(Timestamp::Zoned(
                offset(10).with_ymd_and_hms(2024, 5, 5, 0, 0, 0).unwrap()
            ))
        );

        let post = parser.parse_post(
            "2024-05-05-quince",
            "title: Quince\npublished: 2024-05-07 09:30:00\n\nQuince.\n",
        )?;
        assert_eq!(
            post.meta.published,
            Some(Timestamp::Zoned(
                offset(10).with_ymd_and_hms(2024, 5, 7, 9, 30, 0).unwrap()
            ))
        );

        let post = parser.parse_post("1999-05-05-party", "title: Party\n\nParty.\n")?;
        assert_eq!(post.meta.published, None);
        Ok(())
    }

    #[test]
    fn test_named_zone_follows_daylight_saving() -> Result<()> {
        let parser = Parser::new(
            Zone::Named(chrono_tz::Europe::London),
            false,
            offset(0).with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );
        let winter = parser.parse_post("2024-01-15-frost", "title: Frost\n\nCold.\n")?;
        let summer = parser.parse_post(
            "summer",
            "title: Summer\npublished: 2024-07-01 09:00\nupdated: 2024-12-01 09:00\n\nWarm.\n",
        )?;
        assert_eq!(
            winter.meta.published,
            Some(Timestamp::Zoned(
                offset(0).with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
            ))
        );
        assert_eq!(
            summer.meta.published,
            Some(Timestamp::Zoned(
                offset(1).with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()
            ))
        );
        assert_eq!(
            summer.meta.updated,
            Some(Timestamp::Zoned(
                offset(0).with_ymd_and_hms(2024, 12, 1, 9, 0, 0).unwrap()
            ))
        );
        let offset_of = |ts: Option<Timestamp>| {
            ts.and_then(|ts| ts.zoned())
                .map(|dt| dt.offset().local_minus_utc())
        };
        assert_eq!(offset_of(winter.meta.published), Some(0));
        assert_eq!(offset_of(summer.meta.published), Some(3600));
        assert_eq!(offset_of(summer.meta.updated), Some(0));
        Ok(())
    }

    #[test]
    fn test_keeps_explicit_offsets() -> Result<()> {
        let post = parser(false).parse_post(
            "hello",
            "title: Hello\n\
             published: 2024-05-19T08:30:00+10:00\n\
             updated: 2024-05-20\n\
             \n\
             Hello.\n",
        )?;
        assert_eq!(
            post.meta.published,
            Some(Timestamp::Zoned(
                offset(10).with_ymd_and_hms(2024, 5, 19, 8, 30, 0).unwrap()
            ))
        );
        assert_eq!(
            post.meta.updated,
            Some(Timestamp::Zoned(
                offset(0).with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap()
            ))
        );
        Ok(())
    }

    #[test]
    fn test_parse_posts_orders_by_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in &[
            "2024-05-05-quince",
            "2024-05-05-abacus",
            "2024-05-02-vote",
            "2024-05-03-count",
        ] {
            let title = &name[11..];
            write(
                dir.path(),
                &format!("{}.markdown", name),
                &format!("title: {}\n\nHello, {}.\n", title, title),
            )?;
        }
        write(dir.path(), "notes.txt", "not a post")?;
        write(
            dir.path(),
            "2024/06/nested.markdown",
            "title: nested\npublished: 2024-05-01\n\nNested.\n",
        )?;

        let posts = parser(false).parse_posts(dir.path())?;
        let names: Vec<&str> = posts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "2024/06/nested",
                "2024-05-02-vote",
                "2024-05-03-count",
                "2024-05-05-abacus",
                "2024-05-05-quince",
            ]
        );
        assert_eq!(posts[1].meta.title, "vote");
        assert_eq!(posts[1].body, "Hello, vote.\n");
        assert!(posts.iter().all(|p| !p.meta.draft));
        Ok(())
    }

    #[test]
    fn test_drafts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "2024-05-01-past.markdown", "title: Past\n\nPast.\n")?;
        write(dir.path(), "2024-07-01-future.markdown", "title: Future\n\nFuture.\n")?;
        write(dir.path(), "undated.markdown", "title: Undated\n\nUndated.\n")?;

        let posts = parser(false).parse_posts(dir.path())?;
        let names: Vec<&str> = posts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["2024-05-01-past"]);

        let posts = parser(true).parse_posts(dir.path())?;
        let drafts: Vec<(&str, bool)> =
            posts.iter().map(|p| (p.name.as_str(), p.meta.draft)).collect();
        assert_eq!(
            drafts,
            vec![
                ("2024-05-01-past", false),
                ("2024-07-01-future", true),
                ("undated", true),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_errors_name_the_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "broken.markdown", "title: Broken\nNo blank line.\n")?;
        match parser(false).parse_posts(dir.path()) {
            Err(err @ Error::Annotated(..)) => {
                assert!(err.to_string().contains("broken.markdown"), "{}", err)
            }
            Err(err) => panic!("unexpected error: {}", err),
            Ok(_) => panic!("expected an error"),
        }
        Ok(())
    }

    #[test]
    fn test_post_name() -> Result<()> {
        assert_eq!(post_name(Path::new("2024/05/hello.markdown"))?, "2024/05/hello");
        assert_eq!(post_name(Path::new("hello.markdown"))?, "hello");
        assert!(post_name(Path::new("../hello.markdown")).is_err());
        Ok(())
    }
}
