use pulldown_cmark::{html, Options, Parser};

/// Converts a Markdown document into an HTML fragment. Footnotes, smart
/// punctuation, strikethrough, tables and task lists are enabled.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_renders_tables() {
        let html = to_html("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.starts_with("<table>"), "{}", html);
    }

    #[test]
    fn test_strikethrough() {
        assert_eq!(to_html("~~gone~~"), "<p><del>gone</del></p>\n");
    }
}
