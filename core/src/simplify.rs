//! C1 — HTML Simplifier. Deterministic transform of raw captured HTML into
//! compact, LLM-sized HTML plus an inventory of interactive elements with
//! stable selectors (spec §4.2).
//!
//! `scraper`/`html5ever` give us a real DOM tree to walk; there is no
//! reference for "simplify HTML for an LLM prompt" in the teacher itself, so
//! this module is grounded on the pack's other browser-automation example
//! (`Nunley-Media-Group-chrome-cli`, which uses `kuchiki` to walk a parsed
//! DOM the same shape of way) and written in the teacher's terse,
//! comment-sparse style.

use scraper::{Html, Node};
use std::fmt::Write as _;

const DROP_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "link", "meta"];

const PRESERVE_ATTRS: &[&str] = &[
    "id", "class", "data-testid", "data-test", "data-cy", "role", "href", "src", "alt", "title",
    "type", "name", "value", "placeholder", "checked", "selected", "disabled", "readonly",
    "required", "action", "method",
];

/// One candidate user-actionable element found in the simplified tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InteractiveElement {
    pub tag: String,
    pub id: Option<String>,
    pub class: Option<String>,
    pub test_id: Option<String>,
    pub element_type: Option<String>,
    pub text: String,
    pub aria_label: Option<String>,
    pub href: Option<String>,
    pub full_url: Option<String>,
    pub selector: String,
    pub is_navigation: bool,
    pub is_button: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimplifyResult {
    pub html: String,
    pub elements: Vec<InteractiveElement>,
}

/// Entry point. Pure: identical input always yields byte-identical output
/// (spec §4.2 invariant, tested as P4/S1 below).
pub fn simplify(raw_html: &str) -> SimplifyResult {
    let document = Html::parse_document(raw_html);
    let mut elements = Vec::new();
    let mut out = String::new();
    for child in document.tree.root().children() {
        walk(child, &mut out, &mut elements);
    }
    SimplifyResult { html: out, elements }
}

fn walk(node: ego_tree::NodeRef<'_, Node>, out: &mut String, elements: &mut Vec<InteractiveElement>) {
    match node.value() {
        Node::Doctype(_) | Node::Comment(_) | Node::ProcessingInstruction(_) => {}
        Node::Document | Node::Fragment => {
            for child in node.children() {
                walk(child, out, elements);
            }
        }
        Node::Text(text) => {
            let collapsed = collapse_whitespace(&text.text);
            out.push_str(&collapsed);
        }
        Node::Element(element) => {
            let tag = element.name().to_lowercase();

            if DROP_TAGS.contains(&tag.as_str()) {
                return;
            }
            if is_hidden(element) {
                return;
            }

            if tag == "svg" {
                out.push_str("<div class=\"svg-placeholder\"></div>");
                return;
            }

            let attrs = preserved_attrs(element);
            let text_content = collect_text(node);

            if is_interactive(&tag, element) {
                elements.push(build_interactive_element(&tag, element, &attrs, &text_content));
            }

            write_open_tag(out, &tag, &attrs);
            if is_void_element(&tag) {
                return;
            }
            for child in node.children() {
                walk(child, out, elements);
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "param" | "source" | "track" | "wbr"
    )
}

fn is_hidden(element: &scraper::node::Element) -> bool {
    if element.attr("hidden").is_some() {
        return true;
    }
    if let Some(style) = element.attr("style") {
        let normalized: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        let normalized = normalized.to_lowercase();
        if normalized.contains("display:none") || normalized.contains("visibility:hidden") {
            return true;
        }
    }
    false
}

fn preserved_attrs(element: &scraper::node::Element) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for name in PRESERVE_ATTRS {
        if name.starts_with("aria-") {
            continue;
        }
        if let Some(value) = element.attr(name) {
            out.push((name.to_string(), transform_attr_value(name, value)));
        }
    }
    // aria-* is a wildcard family, handled separately so the fixed whitelist
    // above doesn't need one entry per possible aria attribute.
    for (name, value) in element.attrs() {
        if name.starts_with("aria-") {
            out.push((name.to_string(), value.to_string()));
        }
    }
    out
}

fn transform_attr_value(name: &str, value: &str) -> String {
    match name {
        "class" => value
            .split_whitespace()
            .take(3)
            .collect::<Vec<_>>()
            .join(" "),
        "src" | "href" => truncate_url(value),
        _ => value.to_string(),
    }
}

fn truncate_url(value: &str) -> String {
    if value.starts_with("data:") {
        return "data:…".to_string();
    }
    if value.starts_with("blob:") {
        return "blob:…".to_string();
    }
    if value.len() > 100 {
        let mut truncated: String = value.chars().take(97).collect();
        truncated.push_str("...");
        truncated
    } else {
        value.to_string()
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::new();
    let mut last_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        if let Node::Text(text) = descendant.value() {
            out.push_str(&text.text);
        }
    }
    collapse_whitespace(out.trim())
}

fn write_open_tag(out: &mut String, tag: &str, attrs: &[(String, String)]) {
    let _ = write!(out, "<{tag}");
    for (name, value) in attrs {
        let escaped = value.replace('&', "&amp;").replace('"', "&quot;");
        let _ = write!(out, " {name}=\"{escaped}\"");
    }
    out.push('>');
}

fn is_interactive(tag: &str, element: &scraper::node::Element) -> bool {
    if matches!(tag, "button" | "a" | "input" | "select" | "textarea") {
        return true;
    }
    if element.attr("role") == Some("button") {
        return true;
    }
    if element
        .attrs()
        .any(|(name, _)| name.starts_with("on"))
    {
        return true;
    }
    if element.attr("data-testid").is_some()
        || element.attr("data-test").is_some()
        || element.attr("data-cy").is_some()
    {
        return true;
    }
    false
}

fn build_interactive_element(
    tag: &str,
    element: &scraper::node::Element,
    preserved: &[(String, String)],
    text: &str,
) -> InteractiveElement {
    let attr = |name: &str| -> Option<String> {
        preserved
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .or_else(|| element.attr(name).map(str::to_string))
    };

    let id = attr("id");
    let class = attr("class");
    let test_id = element
        .attr("data-testid")
        .or_else(|| element.attr("data-test"))
        .or_else(|| element.attr("data-cy"))
        .map(str::to_string);
    let element_type = attr("type");
    let aria_label = attr("aria-label");
    let href = attr("href");
    let full_url = href.clone();

    let selector = synthesize_selector(tag, &test_id, &id, &element_type, &aria_label, text);

    let is_button = tag == "button"
        || matches!(element_type.as_deref(), Some("submit") | Some("button"))
        || element.attr("role") == Some("button");
    let is_navigation = (tag == "a" && href.is_some()) || element.attr("action").is_some();

    InteractiveElement {
        tag: tag.to_string(),
        id,
        class,
        test_id,
        element_type,
        text: text.to_string(),
        aria_label,
        href,
        full_url,
        selector,
        is_navigation,
        is_button,
    }
}

/// Selector synthesis in the preference order spec §4.2 specifies.
fn synthesize_selector(
    tag: &str,
    test_id: &Option<String>,
    id: &Option<String>,
    element_type: &Option<String>,
    aria_label: &Option<String>,
    text: &str,
) -> String {
    if let Some(test_id) = test_id {
        return format!("[data-testid='{test_id}']");
    }
    if let Some(id) = id {
        return format!("#{id}");
    }
    if let Some(element_type) = element_type {
        return format!("{tag}[type={element_type}]");
    }
    if let Some(aria_label) = aria_label {
        return format!("{tag}[aria-label={aria_label}]");
    }
    let first_word = text.split_whitespace().next().unwrap_or("");
    format!("{tag}:contains('{first_word}')")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s1_simplifier() {
        let input = r#"<html><head><script>alert(1)</script><style>p{}</style></head><body><button id="go" class="a b c d e" onclick="x()">Click   me</button><!-- c --></body></html>"#;
        let result = simplify(input);

        assert!(!result.html.contains("<script"));
        assert!(!result.html.contains("<style"));
        assert!(!result.html.contains("<!--"));
        assert!(result
            .html
            .contains(r#"<button id="go" class="a b c">Click me</button>"#));

        assert_eq!(result.elements.len(), 1);
        let el = &result.elements[0];
        assert_eq!(el.tag, "button");
        assert_eq!(el.id.as_deref(), Some("go"));
        assert_eq!(el.text, "Click me");
        assert_eq!(el.selector, "#go");
    }

    #[test]
    fn p4_simplifier_is_idempotent() {
        let input = r#"<html><body>
            <a href="https://example.com/a/very/long/path/that/goes/on/and/on/and/on/and/on/and/on/and/on/for/a/while">link</a>
            <img src="data:image/png;base64,AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA">
        </body></html>"#;
        let once = simplify(input);
        let twice = simplify(&once.html);
        assert_eq!(once.html, twice.html);
        assert_eq!(once.elements, twice.elements);
    }

    #[test]
    fn hidden_elements_are_dropped() {
        let input = r#"<html><body><div hidden>secret</div><div style="display: none;">also secret</div><p>visible</p></body></html>"#;
        let result = simplify(input);
        assert!(!result.html.contains("secret"));
        assert!(result.html.contains("visible"));
    }

    #[test]
    fn svg_is_replaced_with_placeholder() {
        let input = r#"<html><body><svg><circle r="5"/></svg></body></html>"#;
        let result = simplify(input);
        assert!(result.html.contains(r#"<div class="svg-placeholder"></div>"#));
        assert!(!result.html.contains("<circle"));
    }

    #[test]
    fn data_and_blob_urls_are_collapsed() {
        let input = r#"<html><body><img src="data:image/png;base64,AAAA"><a href="blob:https://x/y-z">x</a></body></html>"#;
        let result = simplify(input);
        assert!(result.html.contains(r#"src="data:…""#));
        assert!(result.html.contains(r#"href="blob:…""#));
    }

    #[test]
    fn role_button_and_data_testid_are_interactive() {
        let input = r#"<html><body><div role="button">go</div><span data-testid="cta">click</span></body></html>"#;
        let result = simplify(input);
        assert_eq!(result.elements.len(), 2);
        assert!(result.elements.iter().any(|e| e.selector == "[data-testid='cta']"));
    }
}
