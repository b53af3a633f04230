//! The library code for the `sheaf` static blog generator. A generation pass
//! ([`crate::build`]) runs these steps:
//!
//! 1. Loading the blog metadata and posts from source files on disk
//!    ([`crate::config`], [`crate::parser`], [`crate::post`])
//! 2. Indexing the posts by every combination of their tags
//!    ([`crate::tag`])
//! 3. Rendering post, index and tag browse pages through templates
//!    ([`crate::write`], [`crate::value`])
//! 4. Writing the Atom feed as a chain of linked pages ([`crate::feed`],
//!    [`crate::xml`])
//!
//! The tag index is the interesting part. Every non-empty subset of a post's
//! tags is indexed, so a browse page for any combination can list the tags
//! that would narrow it further and the combinations that would widen it,
//! without querying anything at render time.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod feed;
pub mod markdown;
pub mod parser;
pub mod post;
pub mod tag;
pub mod value;
pub mod write;
pub mod xml;
