//! Defines the [`TagIndex`], which answers "which posts carry exactly this
//! combination of tags" for the tag browse pages, and the [`TagInfo`]
//! projection handed to templates.
//!
//! Tags are matched on their normal form (see [`normalize`]), so `Big Data`,
//! `bigData` and `big data` are the same tag. The index remembers the most
//! recently seen spelling of each tag as its display label.
//!
//! A post tagged with `n` distinct tags is recorded under every one of the
//! `2^n - 1` non-empty combinations of those tags. This makes the narrowing
//! and widening queries simple lookups, at the price of an index that grows
//! exponentially with the number of tags on a single post. Keep tag lists
//! short.

use crate::post::Post;
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A combination of normalized tags.
pub type TagSet = BTreeSet<String>;

/// The default path template for tag browse pages. `{tags}` is replaced by
/// the normalized tags, sorted and joined with `+`.
pub const DEFAULT_HREF_FORMAT: &str = "tagged/{tags}.html";

/// Converts a tag as written into the form used for matching and in file
/// names: everything but letters, digits and underscores is removed and the
/// rest is lower-cased.
pub fn normalize(term: &str) -> String {
    term.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Information about one tag or combination of tags, for templates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagInfo {
    /// The display label.
    pub label: String,

    /// The path of the browse page for the combination.
    pub href: String,

    /// The number of posts carrying the combination.
    pub count: usize,
}

impl TagInfo {
    fn new(label: String, href: String, count: usize) -> TagInfo {
        TagInfo { label, href, count }
    }
}

/// Indexes [`Post`]s by every combination of their tags. An index is built
/// for one generation pass and borrows the posts it indexes.
pub struct TagIndex<'a> {
    /// Posts for each combination, in the order combinations were first
    /// seen. No list is ever empty.
    posts_by_tags: IndexMap<TagSet, Vec<&'a Post>>,

    /// The display label for each normalized tag.
    labels: HashMap<String, String>,

    href_format: String,
}

impl Default for TagIndex<'_> {
    fn default() -> Self {
        TagIndex::with_href_format(DEFAULT_HREF_FORMAT)
    }
}

impl<'a> TagIndex<'a> {
    pub fn new() -> Self {
        TagIndex::default()
    }

    /// Creates an index whose browse pages are named by `href_format`, which
    /// should contain `{tags}`.
    pub fn with_href_format(href_format: &str) -> Self {
        TagIndex {
            posts_by_tags: IndexMap::new(),
            labels: HashMap::new(),
            href_format: href_format.to_owned(),
        }
    }

    /// Adds a post under every non-empty combination of its tags. Posts
    /// without tags are ignored.
    pub fn add(&mut self, post: &'a Post) {
        let mut tags: Vec<String> = Vec::with_capacity(post.meta.tags.len());
        for term in &post.meta.tags {
            let tag = normalize(term);
            if tag.is_empty() {
                warn!(
                    "post `{}`: ignoring tag {:?} with no word characters",
                    post.name, term
                );
                continue;
            }
            self.labels.insert(tag.clone(), term.clone());
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        if tags.len() > 12 {
            debug!(
                "post `{}` has {} tags and will be indexed under 2^{} - 1 combinations",
                post.name,
                tags.len(),
                tags.len()
            );
        }
        for subset in subsets(&tags) {
            self.posts_by_tags.entry(subset).or_default().push(post);
        }
    }

    /// Information about a single tag, which may be given in any spelling.
    pub fn tag_info(&self, term: &str) -> Result<TagInfo> {
        let tag = normalize(term);
        let key: TagSet = std::iter::once(tag.clone()).collect();
        match (self.labels.get(&tag), self.posts_by_tags.get(&key)) {
            (Some(label), Some(posts)) => Ok(TagInfo::new(
                label.clone(),
                self.tags_file(&key),
                posts.len(),
            )),
            _ => Err(NotFoundError::new(&key)),
        }
    }

    /// The posts carrying exactly this combination of tags (given in any
    /// spelling), or `None` if no post does.
    pub fn posts_for_terms<I, S>(&self, terms: I) -> Option<&[&'a Post]>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key: TagSet = terms.into_iter().map(|t| normalize(t.as_ref())).collect();
        self.posts_by_tags.get(&key).map(Vec::as_slice)
    }

    /// Tag information for each of a post's own tags, most common first and
    /// ties broken alphabetically. `None` if the post has no tags.
    pub fn post_tags(&self, post: &Post) -> Result<Option<Vec<TagInfo>>> {
        let mut seen = BTreeSet::new();
        let mut infos = Vec::new();
        for term in &post.meta.tags {
            let tag = normalize(term);
            if !tag.is_empty() && seen.insert(tag) {
                infos.push(self.tag_info(term)?);
            }
        }
        if infos.is_empty() {
            return Ok(None);
        }
        infos.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        Ok(Some(infos))
    }

    /// The browse-page path for a combination of already-normalized tags.
    pub fn tags_file<I, S>(&self, tags: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = tags.into_iter().map(|t| t.as_ref().to_owned()).collect();
        tags.sort();
        self.href_format.replace("{tags}", &tags.join("+"))
    }

    /// Tags that, added to `tags` (already normalized), select strictly fewer
    /// posts. Each [`TagInfo`] is labelled with the added tag and points at
    /// the page for the enlarged combination. Results come in the order the
    /// combinations were first indexed.
    pub fn narrowing_tags<I, S>(&self, tags: I) -> Result<Vec<TagInfo>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tag_set = to_tag_set(tags);
        let count = self.count(&tag_set)?;
        Ok(self
            .posts_by_tags
            .iter()
            .filter(|(k, posts)| {
                k.len() == tag_set.len() + 1
                    && k.is_superset(&tag_set)
                    && posts.len() < count
            })
            .filter_map(|(k, posts)| {
                let added = k.difference(&tag_set).next()?;
                Some(TagInfo::new(
                    self.labels.get(added)?.clone(),
                    self.tags_file(k),
                    posts.len(),
                ))
            })
            .collect())
    }

    /// Combinations obtained by removing some of `tags` (already normalized)
    /// that select strictly more posts. Each [`TagInfo`] is labelled with the
    /// remaining tags joined by ` + `. Results are sorted by count, then
    /// label.
    pub fn widening_tags<I, S>(&self, tags: I) -> Result<Vec<TagInfo>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tag_set = to_tag_set(tags);
        let count = self.count(&tag_set)?;
        let tags: Vec<String> = tag_set.iter().cloned().collect();

        let mut infos: Vec<TagInfo> = subsets(&tags)
            .into_iter()
            .filter(|subset| subset.len() < tag_set.len())
            .filter_map(|subset| {
                let wider = self.posts_by_tags.get(&subset)?.len();
                if wider <= count {
                    return None;
                }
                let mut labels: Vec<&str> = subset
                    .iter()
                    .filter_map(|tag| self.labels.get(tag).map(String::as_str))
                    .collect();
                labels.sort_unstable();
                Some(TagInfo::new(labels.join(" + "), self.tags_file(&subset), wider))
            })
            .collect();
        infos.sort_by(|a, b| a.count.cmp(&b.count).then_with(|| a.label.cmp(&b.label)));
        Ok(infos)
    }

    /// The display label for a normalized tag.
    pub fn label(&self, tag: &str) -> Option<&str> {
        self.labels.get(tag).map(String::as_str)
    }

    /// Every indexed combination with its posts, in the order combinations
    /// were first seen.
    pub fn iter(&self) -> impl Iterator<Item = (&TagSet, &[&'a Post])> + '_ {
        self.posts_by_tags.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// The number of indexed combinations.
    pub fn len(&self) -> usize {
        self.posts_by_tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts_by_tags.is_empty()
    }

    fn count(&self, tag_set: &TagSet) -> Result<usize> {
        self.posts_by_tags
            .get(tag_set)
            .map(Vec::len)
            .ok_or_else(|| NotFoundError::new(tag_set))
    }
}

fn to_tag_set<I, S>(tags: I) -> TagSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter().map(|t| t.as_ref().to_owned()).collect()
}

/// Every non-empty subset of `tags` (which must be distinct): all singletons
/// first, then pairs, and so on up to the whole set. Subsets of one size come
/// in lexicographic order of position.
fn subsets(tags: &[String]) -> Vec<TagSet> {
    fn push_combinations(
        tags: &[String],
        size: usize,
        start: usize,
        current: &mut Vec<usize>,
        out: &mut Vec<TagSet>,
    ) {
        if current.len() == size {
            out.push(current.iter().map(|&i| tags[i].clone()).collect());
            return;
        }
        for i in start..tags.len() {
            current.push(i);
            push_combinations(tags, size, i + 1, current, out);
            current.pop();
        }
    }

    let mut out = Vec::new();
    let mut current = Vec::with_capacity(tags.len());
    for size in 1..=tags.len() {
        push_combinations(tags, size, 0, &mut current, &mut out);
    }
    out
}

/// The result of a tag query.
pub type Result<T> = std::result::Result<T, NotFoundError>;

/// Returned when a combination of tags was never indexed, i.e. no post
/// carries it. (The index never holds an empty list.)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFoundError {
    pub tags: Vec<String>,
}

impl NotFoundError {
    fn new(tags: &TagSet) -> NotFoundError {
        NotFoundError {
            tags: tags.iter().cloned().collect(),
        }
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "no posts are tagged `{}`", self.tags.join("+"))
    }
}

impl std::error::Error for NotFoundError {}
