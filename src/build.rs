//! Exports the [`build_site`] function which stitches together the high-level
//! steps of one generation pass: loading the blog metadata
//! ([`crate::config`]) and posts ([`crate::parser`]), indexing them by tag
//! ([`crate::tag`]), copying the static directory into the output directory,
//! rendering the HTML pages ([`crate::write`]), and writing the paged Atom
//! feed ([`crate::feed`]). Nothing is kept from one pass to the next.

use crate::config::{BlogMeta, Config, Error as ConfigError};
use crate::feed::{Error as FeedError, Feed};
use crate::parser::{Error as ParseError, Parser};
use crate::tag::TagIndex;
use crate::write::{newest_first, Error as WriteError, Templates, Writer};
use log::{debug, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What a generation pass produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summary {
    pub posts: usize,
    pub tag_pages: usize,
    pub feed_pages: usize,
}

/// Builds the site from a [`Config`] object. This calls into
/// [`Parser::parse_posts`], the [`Writer`] methods and
/// [`Feed::write_pages`] which do the heavy-lifting. This function also
/// copies the static assets into the output directory.
pub fn build_site(config: &Config) -> Result<Summary> {
    let blog = BlogMeta::from_directory(&config.posts_directory)?;
    let now = match config.now {
        Some(now) => now,
        None => blog.tz.now(),
    };

    // collect all posts
    let parser = Parser::new(blog.tz, config.include_drafts, now);
    let posts = parser.parse_posts(&config.posts_directory)?;

    let mut tags = TagIndex::new();
    for post in &posts {
        tags.add(post);
    }
    info!("indexed {} tag combination(s)", tags.len());

    // Parse the templates before writing anything.
    let templates = Templates::load(&config.templates_directory)?;

    std::fs::create_dir_all(&config.output_directory).map_err(|err| Error::CreateOutput {
        path: config.output_directory.clone(),
        err,
    })?;

    // copy static directory
    if let Some(static_directory) = &config.static_directory {
        if static_directory.is_dir() {
            copy_dir(static_directory, &config.output_directory)?;
        } else {
            warn!(
                "static directory {} not found; skipping",
                static_directory.display()
            );
        }
    }

    // write the post, index and tag pages
    let writer = Writer {
        templates: &templates,
        output_directory: &config.output_directory,
        site_title: &blog.title,
        tags: &tags,
        locale: config.locale,
    };
    let ordered = newest_first(&posts);
    writer.write_posts(&ordered)?;
    writer.write_index(&ordered)?;
    let tag_pages = writer.write_tag_pages()?;

    // create the atom feed; drafts are rendered but never syndicated
    let syndicated = posts.iter().filter(|post| {
        if post.meta.draft {
            debug!("leaving draft `{}` out of the feed", post.name);
        }
        !post.meta.draft
    });
    let feed_config = blog.feed_config(config.page_size);
    let feed_pages =
        Feed::new(&feed_config, syndicated)?.write_pages(&config.output_directory)?;

    Ok(Summary {
        posts: posts.len(),
        tag_pages,
        feed_pages,
    })
}

/// Copies the contents of `src` into `dst`, merging with whatever is
/// already there.
fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    let mut copied = 0;
    for result in WalkDir::new(src).min_depth(1) {
        let entry = result?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::CopyStatic {
                path: entry.path().to_owned(),
                err: std::io::Error::new(std::io::ErrorKind::Other, "outside static directory"),
            })?;
        let target = dst.join(relative);
        let copy_err = |err| Error::CopyStatic {
            path: entry.path().to_owned(),
            err,
        };
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(copy_err)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(copy_err)?;
            copied += 1;
        }
    }
    info!("copied {} static file(s) from {}", copied, src.display());
    Ok(())
}

/// The result of a generation pass.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can be during configuration,
/// parsing, writing pages or feeds, copying static files, and other I/O.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors loading the blog metadata.
    Config(ConfigError),

    /// Returned for errors during parsing.
    Parse(ParseError),

    /// Returned for errors writing [`crate::post::Post`]s to disk as HTML files.
    Write(WriteError),

    /// Returned for errors writing the feed.
    Feed(FeedError),

    /// Returned for I/O problems while creating the output directory.
    CreateOutput { path: PathBuf, err: std::io::Error },

    /// Returned for I/O problems while copying static files.
    CopyStatic { path: PathBuf, err: std::io::Error },

    /// Returned for errors walking the static directory.
    WalkDir(walkdir::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(err) => err.fmt(f),
            Error::Parse(err) => err.fmt(f),
            Error::Write(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::CreateOutput { path, err } => {
                write!(f, "Creating output directory '{}': {}", path.display(), err)
            }
            Error::CopyStatic { path, err } => {
                write!(f, "Copying static file '{}': {}", path.display(), err)
            }
            Error::WalkDir(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Parse(err) => Some(err),
            Error::Write(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::CreateOutput { path: _, err } => Some(err),
            Error::CopyStatic { path: _, err } => Some(err),
            Error::WalkDir(err) => Some(err),
        }
    }
}

impl From<ConfigError> for Error {
    /// Converts [`ConfigError`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

impl From<ParseError> for Error {
    /// Converts [`ParseError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<WriteError> for Error {
    /// Converts [`WriteError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: WriteError) -> Error {
        Error::Write(err)
    }
}

impl From<FeedError> for Error {
    /// Converts [`FeedError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: FeedError) -> Error {
        Error::Feed(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::META_FILE_NAME;
    use crate::write::{INDEX_TEMPLATE, POST_TEMPLATE, TAGGED_TEMPLATE};
    use chrono::{FixedOffset, Locale, TimeZone};
    use std::fs;

    fn write(path: &Path, text: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    fn site(root: &Path) -> Config {
        let posts = root.join("posts");
        write(
            &posts.join(META_FILE_NAME),
            "id: tag:dewinter.example,2024:alice\n\
             title: Alice’s Blog\n\
             url: https://dewinter.example/alice/\n\
             page_size: 2\n",
        );
        write(
            &posts.join("2024-05-01-fruit.markdown"),
            "title: Fruit\ntags: [Fruit]\n\nApples.\n",
        );
        write(
            &posts.join("2024-05-02-salad.markdown"),
            "title: Salad\ntags: [Fruit, Veg]\n\nApples and lettuce.\n",
        );
        write(
            &posts.join("2024-05-03-soup.markdown"),
            "title: Soup\ntags: [Veg]\n\nLeeks.\n",
        );
        write(
            &posts.join("2099-01-01-future.markdown"),
            "title: Future\n\nNot yet.\n",
        );

        let templates = root.join("templates");
        write(&templates.join(POST_TEMPLATE), "{{.title}}");
        write(
            &templates.join(INDEX_TEMPLATE),
            "{{range .reverse_chronological}}{{.title}};{{end}}",
        );
        write(&templates.join(TAGGED_TEMPLATE), "{{.title}}");
        write(&root.join("static/css/site.css"), "body {}");

        Config {
            posts_directory: posts,
            templates_directory: templates,
            static_directory: Some(root.join("static")),
            output_directory: root.join("pub"),
            include_drafts: false,
            now: Some(
                FixedOffset::east_opt(0)
                    .unwrap()
                    .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
                    .unwrap(),
            ),
            page_size: None,
            locale: Locale::POSIX,
        }
    }

    #[test]
    fn test_build_site() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let config = site(dir.path());
        let summary = build_site(&config)?;
        assert_eq!(
            summary,
            Summary {
                posts: 3,
                tag_pages: 3,
                feed_pages: 2,
            }
        );

        let out = &config.output_directory;
        let read = |path: &str| fs::read_to_string(out.join(path)).unwrap();
        assert_eq!(read("2024-05-02-salad.html"), "Salad ");
        assert_eq!(read("index.html"), "Soup;Salad;Fruit; ");
        assert_eq!(read("tagged/fruit+veg.html"), "Fruit + Veg ");
        assert_eq!(read("css/site.css"), "body {}");
        assert!(!out.join("2099-01-01-future.html").exists());

        let feed = atom_syndication::Feed::read_from(read("feed.atom").as_bytes())
            .expect("feed.atom is valid Atom");
        assert_eq!(feed.id(), "tag:dewinter.example,2024:alice");
        let ids: Vec<&str> = feed.entries().iter().map(|e| e.id()).collect();
        assert_eq!(
            ids,
            vec![
                "tag:dewinter.example,2024:alice:2024-05-03-soup",
                "tag:dewinter.example,2024:alice:2024-05-02-salad",
            ]
        );
        assert!(out.join("feed-2.atom").exists());
        Ok(())
    }

    #[test]
    fn test_drafts_are_rendered_when_included() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let mut config = site(dir.path());
        config.include_drafts = true;
        config.page_size = Some(10);
        let summary = build_site(&config)?;
        assert_eq!(summary.posts, 4);
        assert_eq!(summary.feed_pages, 1);
        assert!(config.output_directory.join("2099-01-01-future.html").exists());

        let text = fs::read_to_string(config.output_directory.join("feed.atom")).unwrap();
        let feed = atom_syndication::Feed::read_from(text.as_bytes())
            .expect("feed.atom is valid Atom");
        assert_eq!(feed.entries().len(), 3);
        assert!(feed.entries().iter().all(|e| !e.id().contains("future")));
        assert_eq!(feed.updated().to_rfc3339(), "2024-05-03T00:00:00+00:00");
        Ok(())
    }

    #[test]
    fn test_reports_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(dir.path());
        write(&config.posts_directory.join(META_FILE_NAME), "tz: Mars/Olympus_Mons\n");
        assert!(matches!(build_site(&config), Err(Error::Config(_))));
    }
}
