//! A small namespace-aware XML writer for the documents `sheaf` emits (Atom
//! feeds). It is not a general-purpose XML representation: an [`Element`]
//! holds child elements, or a text value, or nothing at all. Mixed content is
//! not supported, which is all that Atom, site maps and friends need.
//!
//! Namespaces are declared once, on the root element, when a [`Doc`] is
//! written. The caller supplies every prefix it *might* use and only the ones
//! that actually appear on some element or attribute name are declared. The
//! root element's own prefix becomes the default namespace, so a root named
//! `atom:feed` is written as `<feed xmlns="http://www.w3.org/2005/Atom">` and
//! every `atom:` name beneath it loses its prefix.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Write};

/// The namespace bound to the empty prefix unless a [`Doc`] overrides it.
pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// The Atom syndication namespace, bound to the `atom` prefix by default.
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

/// The prefix reserved by XML itself. It is never declared.
const XML_PREFIX: &str = "xml";

/// Returns the built-in prefix to URI bindings. The empty string is the key
/// for the default namespace.
pub fn default_namespaces() -> BTreeMap<String, String> {
    let mut namespaces = BTreeMap::new();
    namespaces.insert(String::new(), XHTML_NAMESPACE.to_owned());
    namespaces.insert("atom".to_owned(), ATOM_NAMESPACE.to_owned());
    namespaces
}

#[derive(Clone, Debug, PartialEq)]
enum Content {
    Empty,
    Text(String),
    Elements(Vec<Element>),
}

/// One element in an XML tree. Names are qualified (`prefix:local`) or bare
/// (`local`, meaning the default namespace). Attributes keep the order in
/// which they were first set.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    content: Content,
}

impl Element {
    /// Creates an element with no attributes and no content.
    pub fn new(name: &str) -> Element {
        Element {
            name: name.to_owned(),
            attrs: Vec::new(),
            content: Content::Empty,
        }
    }

    /// Creates a leaf element holding `text`.
    pub fn text(name: &str, text: &str) -> Element {
        Element {
            name: name.to_owned(),
            attrs: Vec::new(),
            content: Content::Text(text.to_owned()),
        }
    }

    /// Sets an attribute and returns the element, for building in one
    /// expression.
    pub fn with_attr(mut self, name: &str, value: &str) -> Element {
        self.set_attr(name, value);
        self
    }

    /// Sets an attribute, replacing the value (but not the position) of an
    /// existing attribute with the same name.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_owned(),
            None => self.attrs.push((name.to_owned(), value.to_owned())),
        }
    }

    /// Sets the text value. Fails if the element already has children.
    pub fn set_text(&mut self, text: &str) -> Result<()> {
        if let Content::Elements(_) = self.content {
            return Err(Error::MixedContent(self.name.clone()));
        }
        self.content = Content::Text(text.to_owned());
        Ok(())
    }

    /// Builds a child element from a name, attributes and optional text,
    /// appends it, and returns a reference to the new child.
    pub fn element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: Option<&str>,
    ) -> Result<&mut Element> {
        let mut child = match text {
            Some(text) => Element::text(name, text),
            None => Element::new(name),
        };
        for (k, v) in attrs {
            child.set_attr(k, v);
        }
        self.append(child)
    }

    /// Appends an already-built subtree and returns a reference to it. Fails
    /// if this element holds text.
    pub fn append(&mut self, child: Element) -> Result<&mut Element> {
        if let Content::Empty = self.content {
            self.content = Content::Elements(Vec::new());
        }
        match &mut self.content {
            Content::Elements(elements) => {
                let index = elements.len();
                elements.push(child);
                Ok(&mut elements[index])
            }
            _ => Err(Error::MixedContent(self.name.clone())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    pub fn text_value(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn elements(&self) -> &[Element] {
        match &self.content {
            Content::Elements(elements) => elements,
            _ => &[],
        }
    }

    /// Returns the first direct child named `name` whose attributes include
    /// every pair in `attrs`. Grandchildren are not searched.
    pub fn find(&self, name: &str, attrs: &[(&str, &str)]) -> Option<&Element> {
        self.elements().iter().find(|element| {
            element.name == name
                && attrs.iter().all(|(k, v)| element.attr(k) == Some(*v))
        })
    }

    /// Adds every prefix used by this subtree to `out`. An element without a
    /// prefix uses the default namespace (the empty prefix); an attribute
    /// without one is in no namespace and contributes nothing.
    fn collect_prefixes(&self, out: &mut BTreeSet<String>) {
        out.insert(prefix(&self.name).unwrap_or_default().to_owned());
        for (k, _) in &self.attrs {
            if let Some(p) = prefix(k) {
                out.insert(p.to_owned());
            }
        }
        for element in self.elements() {
            element.collect_prefixes(out);
        }
    }

    /// Adds to `out` every attribute whose name clashes with another on the
    /// same element once `promoted` is stripped.
    fn collect_collisions(&self, promoted: Option<&str>, out: &mut Vec<String>) {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut clashing: BTreeSet<&str> = BTreeSet::new();
        for (k, _) in &self.attrs {
            let local = strip(k, promoted);
            if !seen.insert(local) {
                clashing.insert(local);
            }
        }
        for (k, _) in &self.attrs {
            if clashing.contains(strip(k, promoted)) {
                out.push(format!("{} on <{}>", k, self.name));
            }
        }
        for element in self.elements() {
            element.collect_collisions(promoted, out);
        }
    }

    fn write_to<W: Write>(
        &self,
        w: &mut W,
        extra_attrs: &[(String, String)],
        promoted: Option<&str>,
        depth: usize,
    ) -> io::Result<()> {
        let name = strip(&self.name, promoted);
        write!(w, "{:indent$}<{}", "", name, indent = depth * 2)?;
        for (k, v) in self.attrs.iter().chain(extra_attrs) {
            write!(w, " {}=\"{}\"", strip(k, promoted), Escaped::attr(v))?;
        }
        match &self.content {
            Content::Empty => writeln!(w, "/>"),
            Content::Text(text) => writeln!(w, ">{}</{}>", Escaped::text(text), name),
            Content::Elements(elements) => {
                writeln!(w, ">")?;
                for element in elements {
                    element.write_to(w, &[], promoted, depth + 1)?;
                }
                writeln!(w, "{:indent$}</{}>", "", name, indent = depth * 2)
            }
        }
    }
}

/// An XML document: a root [`Element`] plus the namespace bindings available
/// to it.
#[derive(Clone, Debug)]
pub struct Doc {
    root: Element,
    namespaces: BTreeMap<String, String>,
}

impl Doc {
    /// Creates a document using only the [`default_namespaces`].
    pub fn new(root: Element) -> Doc {
        Doc {
            root,
            namespaces: default_namespaces(),
        }
    }

    /// Creates a document whose namespace bindings are the defaults
    /// overridden by `namespaces`.
    pub fn with_namespaces<I, K, V>(root: Element, namespaces: I) -> Doc
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut doc = Doc::new(root);
        for (prefix, uri) in namespaces {
            doc.namespaces.insert(prefix.into(), uri.into());
        }
        doc
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Computes the `xmlns` attributes for the root element. The default
    /// declaration, if any, comes first, followed by prefixed ones sorted by
    /// prefix.
    fn declarations(&self, promoted: Option<&str>) -> Result<Vec<(String, String)>> {
        let mut prefixes = BTreeSet::new();
        self.root.collect_prefixes(&mut prefixes);
        prefixes.remove(XML_PREFIX);

        let mut default = None;
        let mut prefixed = Vec::new();
        for p in prefixes {
            let uri = self
                .namespaces
                .get(&p)
                .ok_or_else(|| Error::UnknownPrefix(p.clone()))?
                .clone();
            if Some(p.as_str()) == promoted {
                default = Some(("xmlns".to_owned(), uri));
            } else if p.is_empty() {
                // The promoted root prefix owns the default namespace.
                if promoted.is_none() {
                    default = Some(("xmlns".to_owned(), uri));
                }
            } else {
                prefixed.push((format!("xmlns:{}", p), uri));
            }
        }
        Ok(default.into_iter().chain(prefixed).collect())
    }

    /// Serializes the document. Every construction problem (unknown prefixes,
    /// attribute collisions) is reported before anything is written.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        let promoted = prefix(&self.root.name);
        let declarations = self.declarations(promoted)?;

        let mut collisions = Vec::new();
        self.root.collect_collisions(promoted, &mut collisions);
        for (k, _) in &declarations {
            if self.root.attrs.iter().any(|(a, _)| strip(a, promoted) == k.as_str()) {
                collisions.push(format!("{} on <{}>", k, self.root.name));
            }
        }
        if !collisions.is_empty() {
            return Err(Error::AttributeCollision(collisions));
        }

        self.root.write_to(&mut w, &declarations, promoted, 0)?;
        Ok(())
    }

    /// Serializes the document into a string.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn prefix(qname: &str) -> Option<&str> {
    qname.split_once(':').map(|(prefix, _)| prefix)
}

fn strip<'n>(qname: &'n str, promoted: Option<&str>) -> &'n str {
    match qname.split_once(':') {
        Some((p, local)) if Some(p) == promoted => local,
        _ => qname,
    }
}

/// Writes a string with XML escaping applied. Attribute values additionally
/// escape double quotes.
struct Escaped<'a> {
    value: &'a str,
    quotes: bool,
}

impl<'a> Escaped<'a> {
    fn text(value: &'a str) -> Self {
        Escaped {
            value,
            quotes: false,
        }
    }

    fn attr(value: &'a str) -> Self {
        Escaped {
            value,
            quotes: true,
        }
    }
}

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut last = 0;
        for (i, c) in self.value.char_indices() {
            let replacement = match c {
                '&' => "&amp;",
                '<' => "&lt;",
                '>' => "&gt;",
                '"' if self.quotes => "&quot;",
                _ => continue,
            };
            f.write_str(&self.value[last..i])?;
            f.write_str(replacement)?;
            last = i + c.len_utf8();
        }
        f.write_str(&self.value[last..])
    }
}

/// The result of a fallible XML operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem building or writing an XML document.
#[derive(Debug)]
pub enum Error {
    /// Returned when text and child elements would be mixed in one element.
    /// Holds the element name.
    MixedContent(String),

    /// Returned when a name uses a prefix with no namespace binding.
    UnknownPrefix(String),

    /// Returned when attribute names clash once the root prefix has been
    /// stripped. Holds every clashing attribute.
    AttributeCollision(Vec<String>),

    /// Returned for I/O errors while writing.
    Io(io::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MixedContent(name) => {
                write!(f, "element `{}` cannot hold both text and elements", name)
            }
            Error::UnknownPrefix(p) => {
                write!(f, "no namespace is bound to prefix `{}`", p)
            }
            Error::AttributeCollision(attrs) => {
                write!(f, "colliding attributes: {}", attrs.join(", "))
            }
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    /// Converts an [`io::Error`] into an [`Error`]. This allows us to use the
    /// `?` operator while writing.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
