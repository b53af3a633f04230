//! Defines the [`Post`] type, the immutable record every other part of
//! `sheaf` reads, together with its typed metadata ([`Meta`]), timestamps
//! ([`Timestamp`]) and authors ([`Person`]). Posts are created by
//! [`crate::parser`] and never modified afterwards.

use crate::markdown;
use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// A source document: a unique slash-separated `name` (the source path
/// relative to the posts directory, less its extension), its metadata, and
/// its Markdown body.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    pub name: String,
    pub meta: Meta,
    pub body: String,
}

impl Post {
    pub fn new(name: &str, meta: Meta, body: &str) -> Post {
        Post {
            name: name.to_owned(),
            meta,
            body: body.to_owned(),
        }
    }

    /// The path of the post's HTML page relative to the output root.
    pub fn href(&self) -> String {
        format!("{}.html", self.name)
    }

    /// The relative path from the post's page back to the output root, e.g.
    /// `../../` for a post named `2024/05/hello`.
    pub fn dotdotslash(&self) -> String {
        "../".repeat(self.name.matches('/').count())
    }

    /// The body rendered from Markdown into an HTML fragment.
    pub fn body_html(&self) -> String {
        markdown::to_html(&self.body)
    }
}

/// Metadata parsed from a post's YAML header. Keys other than the ones named
/// here are kept, in order, in `extra` so templates can use them.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Meta {
    pub title: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub published: Option<Timestamp>,

    #[serde(default)]
    pub updated: Option<Timestamp>,

    #[serde(default)]
    pub author: Option<Person>,

    /// A caller-supplied stable identifier. When present it is used verbatim
    /// as the feed entry id.
    #[serde(default)]
    pub id: Option<String>,

    /// Set by the loader for posts that would not otherwise be published.
    #[serde(skip)]
    pub draft: bool,

    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl Meta {
    /// Creates metadata with a title and nothing else.
    pub fn titled(title: &str) -> Meta {
        Meta {
            title: title.to_owned(),
            tags: Vec::new(),
            published: None,
            updated: None,
            author: None,
            id: None,
            draft: false,
            extra: serde_yaml::Mapping::new(),
        }
    }
}

/// A date and time that may or may not carry a UTC offset. Source files are
/// allowed to omit the offset; the loader then assigns the blog's time zone,
/// so a [`Timestamp::Naive`] that reaches the feed is a bug in the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timestamp {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

/// Formats tried, in order, for timestamps with an explicit offset.
const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%z",
];

/// Formats tried, in order, for timestamps without an offset.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

impl Timestamp {
    /// The zoned value, or `None` if the timestamp is naive.
    pub fn zoned(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Timestamp::Zoned(dt) => Some(*dt),
            Timestamp::Naive(_) => None,
        }
    }

    /// Interprets a naive timestamp as local time at `offset`. Zoned
    /// timestamps are returned unchanged.
    pub fn with_offset(self, offset: FixedOffset) -> Timestamp {
        match self {
            Timestamp::Naive(naive) => match offset.from_local_datetime(&naive) {
                LocalResult::Single(dt) => Timestamp::Zoned(dt),
                _ => self,
            },
            zoned => zoned,
        }
    }

    /// The date and time as written, ignoring any offset.
    pub fn local(&self) -> NaiveDateTime {
        match self {
            Timestamp::Zoned(dt) => dt.naive_local(),
            Timestamp::Naive(naive) => *naive,
        }
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(dt: DateTime<FixedOffset>) -> Timestamp {
        Timestamp::Zoned(dt)
    }
}

impl From<NaiveDate> for Timestamp {
    /// Converts a date into a naive timestamp at midnight.
    fn from(date: NaiveDate) -> Timestamp {
        Timestamp::Naive(date.and_time(chrono::NaiveTime::MIN))
    }
}

impl FromStr for Timestamp {
    type Err = InvalidTimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Timestamp::Zoned(dt));
        }
        for format in ZONED_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, format) {
                return Ok(Timestamp::Zoned(dt));
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Timestamp::Naive(naive));
            }
        }
        match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(date) => Ok(date.into()),
            Err(_) => Err(InvalidTimestampError(s.to_owned())),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Timestamp, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse::<Timestamp>()
            .map_err(D::Error::custom)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Timestamp::Zoned(dt) => f.write_str(&dt.to_rfc3339()),
            Timestamp::Naive(naive) => {
                write!(f, "{}", naive.format("%Y-%m-%dT%H:%M:%S"))
            }
        }
    }
}

/// Returned when a string matches none of the accepted timestamp formats.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidTimestampError(pub String);

impl fmt::Display for InvalidTimestampError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid timestamp: {:?}", &self.0)
    }
}

impl std::error::Error for InvalidTimestampError {}

/// A post author. In YAML this is either just a name or a mapping with
/// `name` and optional `uri` and `email`; both forms become this one shape.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "PersonForm")]
pub struct Person {
    pub name: String,
    pub uri: Option<String>,
    pub email: Option<String>,
}

impl Person {
    pub fn new(name: &str) -> Person {
        Person {
            name: name.to_owned(),
            uri: None,
            email: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PersonForm {
    Name(String),
    Structured {
        name: String,
        #[serde(default)]
        uri: Option<String>,
        #[serde(default)]
        email: Option<String>,
    },
}

impl From<PersonForm> for Person {
    fn from(form: PersonForm) -> Person {
        match form {
            PersonForm::Name(name) => Person {
                name,
                uri: None,
                email: None,
            },
            PersonForm::Structured { name, uri, email } => {
                Person { name, uri, email }
            }
        }
    }
}
