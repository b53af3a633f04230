//! Support for creating paged Atom feeds from a list of posts.
//!
//! Posts are ordered by publication time and cut into windows of
//! [`FeedConfig::page_size`] posts, most recent first. Each window becomes one
//! feed document, linked to its neighbours with RFC 5005 `first`,
//! `previous`, `next` and `last` links. The first page is named
//! `feed.atom` and later ones `feed-{n}.atom` (see [`feed_file`]).

use crate::post::{Person, Post, Timestamp};
use crate::xml::{self, Doc, Element};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use log::{debug, info};
use std::fmt;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;
use url::Url;
use uuid::Uuid;

/// The number of entries per feed page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 12;

const GENERATOR_NAME: &str = env!("CARGO_PKG_NAME");
const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
const GENERATOR_URI: &str = env!("CARGO_PKG_HOMEPAGE");

const ATOM_TYPE: &str = "application/atom+xml";
const HTML_TYPE: &str = "text/html";

/// Bundled configuration for creating a feed.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// The feed's id. Entry ids are derived from it by [`make_id`].
    pub id: String,
    pub title: String,

    /// The URL of the site. When present, all links are absolute and page 1
    /// links to it as `alternate`. A path without a trailing slash is still
    /// treated as a directory.
    pub base_url: Option<Url>,

    /// Entries per page; at least 1.
    pub page_size: usize,
}

/// Names the feed file for a 1-based page number. The writer and the page
/// links both use this.
pub fn feed_file(page: usize) -> String {
    if page <= 1 {
        String::from("feed.atom")
    } else {
        format!("feed-{}.atom", page)
    }
}

/// Adds a trailing slash to the path of `url` if it lacks one, so relative
/// links resolve inside the site instead of next to it.
pub fn site_root(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Creates the entry id for `post` within the feed identified by `feed_id`:
///
/// 1. The post's own `id`, if it has one.
/// 2. For a `tag:` URI feed id: `{feed_id}:{name}`.
/// 3. For a `urn:uuid:` feed id: a version 5 UUID from the feed UUID and the
///    post name, as another `urn:uuid:`.
/// 4. Otherwise: `{feed_id}/{name}`.
///
/// The `:` or `/` separator is only added when `feed_id` doesn't already end
/// with it.
pub fn make_id(feed_id: &str, post: &Post) -> Result<String> {
    if let Some(id) = &post.meta.id {
        return Ok(id.clone());
    }
    if feed_id.starts_with("tag:") && !feed_id.contains('/') {
        let colon = if feed_id.ends_with(':') { "" } else { ":" };
        return Ok(format!("{}{}{}", feed_id, colon, post.name));
    }
    if let Some(namespace) = feed_id.strip_prefix("urn:uuid:") {
        let namespace = Uuid::parse_str(namespace).map_err(|err| Error::InvalidFeedId {
            feed_id: feed_id.to_owned(),
            err,
        })?;
        let uuid = Uuid::new_v5(&namespace, post.name.as_bytes());
        return Ok(format!("urn:uuid:{}", uuid));
    }
    let slash = if feed_id.ends_with('/') { "" } else { "/" };
    Ok(format!("{}{}{}", feed_id, slash, post.name))
}

/// A post accepted into a feed, with its publication time resolved.
struct Published<'a> {
    post: &'a Post,
    published: DateTime<FixedOffset>,
}

/// A paged feed over a set of posts. Built fresh for each generation pass.
pub struct Feed<'a> {
    config: &'a FeedConfig,

    /// [`FeedConfig::base_url`] as a directory.
    base_url: Option<Url>,

    /// Ascending by publication time.
    posts: Vec<Published<'a>>,
}

impl<'a> Feed<'a> {
    /// Creates a feed. Posts without a `published` timestamp are left out.
    /// A `published` timestamp without a UTC offset is an error: the loader
    /// is responsible for assigning time zones.
    pub fn new<I>(config: &'a FeedConfig, posts: I) -> Result<Feed<'a>>
    where
        I: IntoIterator<Item = &'a Post>,
    {
        let mut accepted = Vec::new();
        for post in posts {
            match &post.meta.published {
                None => debug!("leaving unpublished post `{}` out of the feed", post.name),
                Some(ts) => accepted.push(Published {
                    post,
                    published: zoned(post, "published", ts)?,
                }),
            }
        }
        // Stable, so posts published at the same moment keep their order.
        accepted.sort_by_key(|p| p.published);
        Ok(Feed {
            config,
            base_url: config.base_url.as_ref().map(site_root),
            posts: accepted,
        })
    }

    fn page_size(&self) -> usize {
        self.config.page_size.max(1)
    }

    /// The number of feed pages. Zero when there are no posts.
    pub fn page_count(&self) -> usize {
        (self.posts.len() + self.page_size() - 1) / self.page_size()
    }

    fn window_slice(&self, page: usize) -> &[Published<'a>] {
        if page == 0 || page > self.page_count() {
            return &[];
        }
        let end = self.posts.len() - (page - 1) * self.page_size();
        let start = end.saturating_sub(self.page_size());
        &self.posts[start..end]
    }

    /// The posts on a 1-based page, most recent first. Empty for pages out of
    /// range.
    pub fn window(&self, page: usize) -> Vec<&'a Post> {
        self.window_slice(page).iter().rev().map(|p| p.post).collect()
    }

    fn href(&self, path: &str) -> Result<String> {
        match &self.base_url {
            Some(base) => Ok(base.join(path)?.to_string()),
            None => Ok(path.to_owned()),
        }
    }

    fn feed_link(&self, rel: &str, page: usize) -> Result<Element> {
        Ok(Element::new("atom:link")
            .with_attr("rel", rel)
            .with_attr("type", ATOM_TYPE)
            .with_attr("href", &self.href(&feed_file(page))?))
    }

    /// Builds the feed document for a 1-based page.
    pub fn page(&self, page: usize) -> Result<Doc> {
        let page_count = self.page_count();

        let mut updated = None;
        let mut entries = Vec::new();
        for published in self.window_slice(page).iter().rev() {
            let (entry, entry_updated) = self.entry(published)?;
            updated = updated.max(Some(entry_updated));
            entries.push(entry);
        }
        let updated = updated.unwrap_or_else(epoch);

        let mut feed = Element::new("atom:feed");
        feed.element("atom:id", &[], Some(&self.config.id))?;
        feed.element("atom:title", &[], Some(&self.config.title))?;
        feed.element("atom:updated", &[], Some(&format_time(&updated)))?;
        let mut generator = Element::text("atom:generator", GENERATOR_NAME)
            .with_attr("version", GENERATOR_VERSION);
        if !GENERATOR_URI.is_empty() {
            generator.set_attr("uri", GENERATOR_URI);
        }
        feed.append(generator)?;

        feed.append(self.feed_link("self", page)?)?;
        if let (1, Some(base)) = (page, &self.base_url) {
            feed.element(
                "atom:link",
                &[("rel", "alternate"), ("type", HTML_TYPE), ("href", base.as_str())],
                None,
            )?;
        }
        if page > 1 {
            feed.append(self.feed_link("first", 1)?)?;
            feed.append(self.feed_link("previous", page - 1)?)?;
        }
        if page < page_count {
            feed.append(self.feed_link("next", page + 1)?)?;
            feed.append(self.feed_link("last", page_count)?)?;
        }

        for entry in entries {
            feed.append(entry)?;
        }
        Ok(Doc::new(feed))
    }

    /// Builds one entry, returning it with its `updated` time.
    fn entry(&self, published: &Published) -> Result<(Element, DateTime<FixedOffset>)> {
        let post = published.post;
        let updated = match &post.meta.updated {
            Some(ts) => zoned(post, "updated", ts)?,
            None => published.published,
        };

        let mut entry = Element::new("atom:entry");
        entry.element("atom:id", &[], Some(&make_id(&self.config.id, post)?))?;
        entry.element("atom:title", &[], Some(&post.meta.title))?;
        entry.element(
            "atom:published",
            &[],
            Some(&format_time(&published.published)),
        )?;
        entry.element("atom:updated", &[], Some(&format_time(&updated)))?;
        if let Some(author) = &post.meta.author {
            entry.append(person("atom:author", author)?)?;
        }
        entry.element(
            "atom:link",
            &[
                ("rel", "alternate"),
                ("type", HTML_TYPE),
                ("href", &self.href(&post.href())?),
            ],
            None,
        )?;
        entry.element("atom:content", &[("type", "html")], Some(&post.body_html()))?;
        Ok((entry, updated))
    }

    /// Writes every page into `directory`, returning the number of pages.
    /// Each page is fully rendered before its file is created.
    pub fn write_pages(&self, directory: &Path) -> Result<usize> {
        let page_count = self.page_count();
        for page in 1..=page_count {
            let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
            out.push_str(&self.page(page)?.render()?);
            let path = directory.join(feed_file(page));
            std::fs::write(&path, out)?;
            debug!("wrote feed page {}", path.display());
        }
        info!(
            "wrote {} feed page(s) for {} post(s)",
            page_count,
            self.posts.len()
        );
        Ok(page_count)
    }
}

fn person(name: &str, person: &Person) -> Result<Element> {
    let mut result = Element::new(name);
    result.element("atom:name", &[], Some(&person.name))?;
    if let Some(uri) = &person.uri {
        result.element("atom:uri", &[], Some(uri))?;
    }
    if let Some(email) = &person.email {
        result.element("atom:email", &[], Some(email))?;
    }
    Ok(result)
}

fn zoned(post: &Post, field: &'static str, ts: &Timestamp) -> Result<DateTime<FixedOffset>> {
    ts.zoned().ok_or_else(|| Error::NaiveTimestamp {
        post: post.name.clone(),
        field,
    })
}

fn format_time(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The `updated` time of a feed page with no entries.
fn epoch() -> DateTime<FixedOffset> {
    DateTime::<Utc>::from(UNIX_EPOCH).into()
}

/// The result of a fallible feed operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when a post timestamp reaching the feed has no UTC offset.
    NaiveTimestamp { post: String, field: &'static str },

    /// Returned when a `urn:uuid:` feed id does not hold a valid UUID.
    InvalidFeedId { feed_id: String, err: uuid::Error },

    /// Returned when a link can't be resolved against the base URL.
    UrlParse(url::ParseError),

    /// Returned when the feed document can't be built or written.
    Xml(xml::Error),

    /// Returned for I/O errors writing feed files.
    Io(io::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NaiveTimestamp { post, field } => write!(
                f,
                "post `{}`: `{}` has no time zone",
                post, field
            ),
            Error::InvalidFeedId { feed_id, err } => {
                write!(f, "invalid feed id `{}`: {}", feed_id, err)
            }
            Error::UrlParse(err) => err.fmt(f),
            Error::Xml(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NaiveTimestamp { .. } => None,
            Error::InvalidFeedId { err, .. } => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::Xml(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<xml::Error> for Error {
    /// Converts [`xml::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator while building feed documents.
    fn from(err: xml::Error) -> Error {
        Error::Xml(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts [`url::ParseError`]s into [`Error`].
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<io::Error> for Error {
    /// Converts [`io::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
