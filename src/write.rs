//! Renders the HTML side of the site: one page per post, the `index.html`
//! listing, and one browse page per indexed combination of tags. See
//! [`crate::value`] for what each template gets to see.

use crate::feed::feed_file;
use crate::post::Post;
use crate::tag::{NotFoundError, TagIndex};
use crate::value::{post_value, tag_infos};
use chrono::Locale;
use gtmpl::{Template, Value};
use log::{debug, info};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// The template for post pages.
pub const POST_TEMPLATE: &str = "post.html";

/// The template for the front page.
pub const INDEX_TEMPLATE: &str = "index.html";

/// The template for tag browse pages.
pub const TAGGED_TEMPLATE: &str = "tagged.html";

/// Files in this subdirectory of the templates directory are prepended to
/// every template, so they can `{{define}}` shared blocks.
pub const PARTIALS_DIRECTORY: &str = "partials";

/// The parsed page templates.
pub struct Templates {
    pub post: Template,
    pub index: Template,
    pub tagged: Template,
}

impl Templates {
    /// Loads and parses the templates in `directory`.
    pub fn load(directory: &Path) -> Result<Templates> {
        let partials = partials(&directory.join(PARTIALS_DIRECTORY))?;
        let load = |name: &str| {
            let main = directory.join(name);
            parse_template(partials.iter().map(PathBuf::as_path).chain(Some(main.as_path())))
        };
        let templates = Templates {
            post: load(POST_TEMPLATE)?,
            index: load(INDEX_TEMPLATE)?,
            tagged: load(TAGGED_TEMPLATE)?,
        };
        info!(
            "loaded templates from {} ({} partial(s))",
            directory.display(),
            partials.len()
        );
        Ok(templates)
    }
}

fn partials(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

// Loads the template file contents, concatenates them, and parses the result
// into a template.
fn parse_template<'p>(template_files: impl Iterator<Item = &'p Path>) -> Result<Template> {
    let mut contents = String::new();
    let mut last = PathBuf::new();
    for template_file in template_files {
        use std::io::Read;
        File::open(template_file)
            .map_err(|err| Error::OpenTemplateFile {
                path: template_file.to_owned(),
                err,
            })?
            .read_to_string(&mut contents)?;
        contents.push(' ');
        last = template_file.to_owned();
    }

    let mut template = Template::default();
    template
        .parse(&contents)
        .map_err(|err| Error::ParseTemplate { path: last, err })?;
    Ok(template)
}

/// Orders posts most recent first. Posts without a publication date are
/// drafts and come before all others.
pub fn newest_first<'p>(posts: impl IntoIterator<Item = &'p Post>) -> Vec<&'p Post> {
    let mut posts: Vec<&Post> = posts.into_iter().collect();
    posts.sort_by_key(|post| {
        let published = post.meta.published.and_then(|ts| ts.zoned());
        (published.is_none(), published)
    });
    posts.reverse();
    posts
}

/// Templates and writes HTML pages to disk.
pub struct Writer<'a> {
    pub templates: &'a Templates,

    /// The root of the output site.
    pub output_directory: &'a Path,

    /// Made available to every template as `site_title`.
    pub site_title: &'a str,

    /// The tag index for the posts being written.
    pub tags: &'a TagIndex<'a>,

    /// Used for month names.
    pub locale: Locale,
}

impl Writer<'_> {
    /// Templates a single page and writes it to `relative_path` under the
    /// output directory. Every page also gets `site_title`, `root` (the
    /// relative path back to the output root) and `feed_href`.
    fn write_page(&self, relative_path: &str, template: &Template, mut value: Value) -> Result<()> {
        let root = "../".repeat(relative_path.matches('/').count());
        if let Value::Object(obj) = &mut value {
            obj.insert("site_title".to_owned(), Value::String(self.site_title.to_owned()));
            obj.insert("feed_href".to_owned(), Value::String(format!("{}{}", root, feed_file(1))));
            obj.insert("root".to_owned(), Value::String(root));
        }

        let path = self.output_directory.join(relative_path);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let context = gtmpl::Context::from(value)?;
        template.execute(&mut File::create(&path)?, &context)?;
        debug!("wrote {}", path.display());
        Ok(())
    }

    fn post_value(&self, post: &Post) -> Result<Value> {
        let tags = self.tags.post_tags(post)?;
        Ok(post_value(post, tags.as_deref(), self.locale))
    }

    /// Writes one page per post to `{name}.html`. `posts` must be newest
    /// first (see [`newest_first`]); each page gets the neighbouring posts as
    /// `prev` (older) and `next` (newer).
    pub fn write_posts(&self, posts: &[&Post]) -> Result<()> {
        for (i, post) in posts.iter().enumerate() {
            let mut value = self.post_value(post)?;
            if let Value::Object(obj) = &mut value {
                let neighbour = |post: Option<&&Post>| post.map_or(Value::Nil, |p| link_value(p));
                obj.insert("prev".to_owned(), neighbour(posts.get(i + 1)));
                obj.insert(
                    "next".to_owned(),
                    neighbour(i.checked_sub(1).and_then(|j| posts.get(j))),
                );
            }
            self.write_page(&post.href(), &self.templates.post, value)?;
        }
        info!("wrote {} post page(s)", posts.len());
        Ok(())
    }

    /// Writes `index.html`, whose `reverse_chronological` list holds every
    /// post newest first.
    pub fn write_index(&self, posts: &[&Post]) -> Result<()> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert(
            "reverse_chronological".to_owned(),
            Value::Array(
                posts
                    .iter()
                    .map(|post| self.post_value(post))
                    .collect::<Result<Vec<Value>>>()?,
            ),
        );
        self.write_page(INDEX_TEMPLATE, &self.templates.index, Value::Object(m))
    }

    /// Writes a browse page for every indexed combination of tags. Each page
    /// gets `title` (the labels joined by ` + `), `tags`, `posts` (newest
    /// first), `narrowing` and `widening`.
    pub fn write_tag_pages(&self) -> Result<usize> {
        let mut count = 0;
        for (tag_set, posts) in self.tags.iter() {
            let labels: Vec<&str> = tag_set
                .iter()
                .map(|tag| self.tags.label(tag).unwrap_or(tag))
                .collect();
            let infos = tag_set
                .iter()
                .map(|tag| self.tags.tag_info(tag))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut m: HashMap<String, Value> = HashMap::new();
            m.insert("title".to_owned(), Value::String(labels.join(" + ")));
            m.insert("tags".to_owned(), tag_infos(&infos));
            m.insert(
                "posts".to_owned(),
                Value::Array(
                    newest_first(posts.iter().copied())
                        .into_iter()
                        .map(|post| self.post_value(post))
                        .collect::<Result<Vec<Value>>>()?,
                ),
            );
            m.insert("narrowing".to_owned(), tag_infos(&self.tags.narrowing_tags(tag_set)?));
            m.insert("widening".to_owned(), tag_infos(&self.tags.widening_tags(tag_set)?));

            self.write_page(&self.tags.tags_file(tag_set), &self.templates.tagged, Value::Object(m))?;
            count += 1;
        }
        info!("wrote {} tag page(s)", count);
        Ok(count)
    }
}

fn link_value(post: &Post) -> Value {
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert("title".to_owned(), Value::String(post.meta.title.clone()));
    m.insert("href".to_owned(), Value::String(post.href()));
    Value::Object(m)
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems while opening template files.
    OpenTemplateFile { path: PathBuf, err: io::Error },

    /// Returned for errors parsing template files.
    ParseTemplate { path: PathBuf, err: String },

    /// An error during templating.
    Template(String),

    /// Returned when a page asks for tags the index doesn't have.
    Tag(NotFoundError),

    /// An error writing the output files.
    Io(io::Error),
}

impl From<io::Error> for Error {
    /// Converts an [`io::Error`] into an [`Error`]. This allows us to use the
    /// `?` operator for fallible I/O operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<String> for Error {
    /// Converts a template error message ([`String`]) into an [`Error`]. This
    /// allows us to use the `?` operator for fallible template operations.
    fn from(err: String) -> Error {
        Error::Template(err)
    }
}

impl From<NotFoundError> for Error {
    fn from(err: NotFoundError) -> Error {
        Error::Tag(err)
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OpenTemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::ParseTemplate { path, err } => {
                write!(f, "Parsing template '{}': {}", path.display(), err)
            }
            Error::Template(err) => err.fmt(f),
            Error::Tag(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::OpenTemplateFile { err, .. } => Some(err),
            Error::ParseTemplate { .. } => None,
            Error::Template(_) => None,
            Error::Tag(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}
