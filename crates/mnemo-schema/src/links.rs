//! `[[uuid]]` wiki-style link references inside record bodies.

use std::sync::LazyLock;

use regex::Regex;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]\n]+)\]\]").expect("link pattern is valid"));

/// Every `[[...]]` reference in `body`, trimmed, in order of appearance.
pub fn body_links(body: &str) -> Vec<&str> {
    LINK_RE
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .collect()
}
