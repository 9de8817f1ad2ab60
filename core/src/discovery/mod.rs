//! C6 — Action Discovery. Builds prompts from a page's simplified HTML and
//! element inventory, parses the LLM's natural-language answer into typed
//! `DiscoveredAction` records, flags ones existing test files already
//! cover, synthesizes per-action selectors/JS via a second narrower LLM
//! call, and deduplicates/merges against what's already known (spec §4.4).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::simplify::InteractiveElement;

/// Keywords the code-synthesis keyword extractor ignores — generic verbs
/// and filler words that appear in almost every action description and so
/// carry no selector-relevant signal.
const STOP_WORDS: &[&str] = &[
    "click", "button", "with", "the", "and", "for", "your", "you", "page", "this", "that",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Lower-cases and matches; anything missing or unrecognised defaults
    /// to `Medium` (spec §4.4 response-parsing rule).
    pub fn from_str_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Pending,
    Click,
    Type,
    Select,
    Navigate,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Pending => "pending",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::Navigate => "navigate",
        }
    }

    pub fn from_str_lenient(raw: &str) -> Self {
        match raw {
            "click" => ActionKind::Click,
            "type" => ActionKind::Type,
            "select" => ActionKind::Select,
            "navigate" => ActionKind::Navigate,
            _ => ActionKind::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredAction {
    pub id: String,
    pub capture_id: String,
    pub description: String,
    pub selector: String,
    pub action_kind: ActionKind,
    pub javascript: String,
    pub is_tested: bool,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub user_input: Option<String>,
}

impl DiscoveredAction {
    /// A freshly parsed action: code synthesis hasn't run yet, so
    /// `action_kind = pending` and `javascript` is empty (spec §3 invariant,
    /// scenario S3).
    pub fn pending(capture_id: &str, description: String, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            capture_id: capture_id.to_owned(),
            description,
            selector: String::new(),
            action_kind: ActionKind::Pending,
            javascript: String::new(),
            is_tested: false,
            priority,
            created_at: Utc::now(),
            user_input: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub description: String,
    pub priority: Priority,
}

/// Builds the primary-discovery prompt: role framing, element counts, up to
/// the 20 most meaningful elements (non-empty text or href), and the first
/// 3000 characters of simplified HTML (spec §4.4).
pub fn build_primary_prompt(simplified_html: &str, elements: &[InteractiveElement]) -> String {
    let meaningful: Vec<&InteractiveElement> = elements
        .iter()
        .filter(|e| !e.text.is_empty() || e.href.is_some())
        .take(20)
        .collect();

    let mut listing = String::new();
    for element in &meaningful {
        listing.push_str(&format!(
            "- <{tag}> selector={selector} text={text:?} href={href:?}\n",
            tag = element.tag,
            selector = element.selector,
            text = element.text,
            href = element.href,
        ));
    }

    let html_excerpt: String = simplified_html.chars().take(3000).collect();

    format!(
        "You are an expert QA engineer inspecting a web page to find the most \
         important user actions to test.\n\
         The page has {element_count} interactive elements ({meaningful_count} with \
         visible text or a link target).\n\n\
         Elements:\n{listing}\n\
         Simplified page HTML (truncated to 3000 chars):\n{html_excerpt}\n\n\
         List the top 5 user actions worth testing on this page, one per line, in the \
         format:\nDESCRIPTION | priority\nwhere priority is one of high, medium, low.",
        element_count = elements.len(),
        meaningful_count = meaningful.len(),
    )
}

/// Builds the incremental-discovery prompt: just the new content slice plus
/// up to 10 previously-known actions, asking the model not to repeat them.
pub fn build_incremental_prompt(new_content: &str, previous_actions: &[DiscoveredAction]) -> String {
    let mut known = String::new();
    for action in previous_actions.iter().take(10) {
        known.push_str("- ");
        known.push_str(&action.description);
        known.push('\n');
    }

    format!(
        "The page changed. New content observed:\n{new_content}\n\n\
         Actions already known (do not repeat these):\n{known}\n\
         List any new user actions worth testing, one per line, in the format:\n\
         DESCRIPTION | priority\nwhere priority is one of high, medium, low."
    )
}

/// Strips a leading enumeration marker (`1.`, `2)`, `-`, `*`) and
/// surrounding whitespace from one response line.
fn strip_leading_enumeration(line: &str) -> &str {
    let trimmed = line.trim_start();
    let trimmed = trimmed.trim_start_matches(['-', '*']).trim_start();

    let digit_len = trimmed
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);

    if digit_len > 0 {
        trimmed[digit_len..].trim_start_matches(['.', ')']).trim_start()
    } else {
        trimmed
    }
}

/// Parses an LLM response in the `DESCRIPTION | priority` line format
/// (spec §4.4, scenario S3). Lines whose description is empty after
/// trimming are discarded; a missing or unrecognised priority defaults to
/// `medium`.
pub fn parse_response(raw: &str) -> Vec<ParsedAction> {
    raw.lines()
        .filter_map(|line| {
            let line = strip_leading_enumeration(line);
            let mut parts = line.splitn(2, '|');
            let description = parts.next().unwrap_or("").trim().to_string();
            if description.is_empty() {
                return None;
            }
            let priority = parts
                .next()
                .map(Priority::from_str_lenient)
                .unwrap_or(Priority::Medium);
            Some(ParsedAction { description, priority })
        })
        .collect()
}

fn extract_test_id(selector: &str) -> Option<String> {
    if !selector.contains("data-testid") {
        return None;
    }
    let start = selector.find('\'')? + 1;
    let rest = &selector[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

/// The case-insensitive substring search terms an action contributes to
/// the "already tested" predicate (spec §4.4).
fn search_terms(action: &DiscoveredAction) -> Vec<String> {
    let mut terms = vec![action.selector.to_lowercase(), action.description.to_lowercase()];
    if let Some(test_id) = extract_test_id(&action.selector) {
        terms.push(test_id.to_lowercase());
    }
    terms.into_iter().filter(|t| !t.is_empty()).collect()
}

/// Marks every action whose search-term set appears as a substring of any
/// existing test file's contents.
pub fn mark_already_tested(actions: &mut [DiscoveredAction], existing_test_file_contents: &[String]) {
    let haystacks: Vec<String> = existing_test_file_contents.iter().map(|s| s.to_lowercase()).collect();
    for action in actions.iter_mut() {
        let terms = search_terms(action);
        action.is_tested = terms
            .iter()
            .any(|term| haystacks.iter().any(|haystack| haystack.contains(term.as_str())));
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn meaningful_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|word| word.len() > 3)
        .collect()
}

/// Two actions are similar when their descriptions are equal after
/// trim/lowercase, one contains the other, or they share at least 50% of
/// their meaningful (length > 3) words (spec §4.4). Symmetric by
/// construction (P6).
pub fn similar(a: &DiscoveredAction, b: &DiscoveredAction) -> bool {
    let na = normalize(&a.description);
    let nb = normalize(&b.description);
    if na == nb {
        return true;
    }
    if na.contains(&nb) || nb.contains(&na) {
        return true;
    }

    let wa = meaningful_words(&a.description);
    let wb = meaningful_words(&b.description);
    if wa.is_empty() || wb.is_empty() {
        return false;
    }
    let shared = wa.intersection(&wb).count();
    let smaller = wa.len().min(wb.len());
    (shared as f64 / smaller as f64) >= 0.5
}

/// Filters `new` down to the actions not similar to anything in `existing`
/// or to an already-kept member of `new` itself — dedup is transitive
/// across both sets (spec §4.4).
pub fn dedup(existing: &[DiscoveredAction], new: &[DiscoveredAction]) -> Vec<DiscoveredAction> {
    let mut kept: Vec<DiscoveredAction> = Vec::new();
    for candidate in new {
        let is_duplicate = existing.iter().any(|e| similar(e, candidate))
            || kept.iter().any(|k| similar(k, candidate));
        if !is_duplicate {
            kept.push(candidate.clone());
        }
    }
    kept
}

/// `merge(existing, new)`: dedup `new` against `existing`, concatenate,
/// then stable-sort by priority bucket so ties keep insertion order
/// (spec §4.4 "Merging").
pub fn merge(existing: &[DiscoveredAction], new: &[DiscoveredAction]) -> Vec<DiscoveredAction> {
    let mut merged = existing.to_vec();
    merged.extend(dedup(existing, new));
    merged.sort_by_key(|action| action.priority);
    merged
}

/// Lower-cased, stop-word-filtered keywords drawn from a description plus
/// optional verbatim user phrasing, used to pick a relevant HTML fragment
/// for code synthesis.
pub fn extract_keywords(description: &str, user_input: Option<&str>) -> Vec<String> {
    let mut text = description.to_lowercase();
    if let Some(extra) = user_input {
        text.push(' ');
        text.push_str(&extra.to_lowercase());
    }
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|word| word.len() > 2 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

/// Selects up to 20 lines of `full_html` mentioning a keyword, falling
/// back to the first 500 characters when nothing matches (spec §4.4).
pub fn extract_relevant_fragment(full_html: &str, keywords: &[String]) -> String {
    let matching: Vec<&str> = full_html
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            keywords.iter().any(|k| lower.contains(k.as_str()))
        })
        .take(20)
        .collect();

    if matching.is_empty() {
        full_html.chars().take(500).collect()
    } else {
        matching.join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeSynthesisResult {
    pub selector: String,
    pub action: String,
    pub javascript: String,
    pub fallback: String,
}

/// Parses the code-synthesis LLM response, expected to be a strict JSON
/// object `{selector, action, javascript, fallback}`, tolerating malformed
/// JSON by extracting the outer `{…}` span and scanning for quoted fields
/// (spec §4.4).
pub fn parse_code_synthesis_response(raw: &str) -> CodeSynthesisResult {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw.trim()) {
        return result_from_value(&value);
    }

    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return CodeSynthesisResult::default();
    };
    if end <= start {
        return CodeSynthesisResult::default();
    }
    let span = &raw[start..=end];

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(span) {
        return result_from_value(&value);
    }
    scan_quoted_fields(span)
}

fn result_from_value(value: &serde_json::Value) -> CodeSynthesisResult {
    let field = |name: &str| value.get(name).and_then(|v| v.as_str()).unwrap_or("").to_string();
    CodeSynthesisResult {
        selector: field("selector"),
        action: field("action"),
        javascript: field("javascript"),
        fallback: field("fallback"),
    }
}

fn scan_quoted_fields(span: &str) -> CodeSynthesisResult {
    let mut result = CodeSynthesisResult::default();
    for field_name in ["selector", "action", "javascript", "fallback"] {
        if let Some(value) = scan_field(span, field_name) {
            match field_name {
                "selector" => result.selector = value,
                "action" => result.action = value,
                "javascript" => result.javascript = value,
                "fallback" => result.fallback = value,
                _ => unreachable!(),
            }
        }
    }
    result
}

fn scan_field(span: &str, field: &str) -> Option<String> {
    let marker = format!("\"{field}\"");
    let key_pos = span.find(&marker)?;
    let after_key = &span[key_pos + marker.len()..];
    let colon_pos = after_key.find(':')?;
    let after_colon = after_key[colon_pos + 1..].trim_start();
    let after_quote = after_colon.strip_prefix('"')?;

    let mut end = None;
    let mut escaped = false;
    for (i, c) in after_quote.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => {
                end = Some(i);
                break;
            }
            _ => {}
        }
    }
    end.map(|e| after_quote[..e].replace("\\\"", "\"").replace("\\\\", "\\"))
}

/// Resolves the final `javascript` for a synthesized action: the LLM's
/// `javascript` field if present, else its `fallback` field, else a
/// composed template that clicks the first interactive element whose text
/// mentions the description's leading keyword (spec §4.4).
pub fn resolve_javascript(result: &CodeSynthesisResult, description: &str) -> String {
    if !result.javascript.is_empty() {
        return result.javascript.clone();
    }
    if !result.fallback.is_empty() {
        return result.fallback.clone();
    }
    build_fallback_template(description)
}

fn build_fallback_template(description: &str) -> String {
    let keyword = extract_keywords(description, None).into_iter().next().unwrap_or_default();
    format!(
        "(() => {{ const candidates = document.querySelectorAll('a, button, [role=button], [onclick]'); \
         for (const el of candidates) {{ if (el.textContent.toLowerCase().includes('{keyword}')) {{ \
         el.click(); return true; }} }} return false; }})()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(capture_id: &str, description: &str, priority: Priority) -> DiscoveredAction {
        DiscoveredAction::pending(capture_id, description.to_owned(), priority)
    }

    #[test]
    fn scenario_s3_parses_pipe_delimited_lines_in_order() {
        let raw = "Go to the pricing page | high\n\
                   Sign in with your account | high\n\
                   Click the Start Sharing Now button | medium\n\
                   View contact information | low";
        let parsed = parse_response(raw);
        assert_eq!(
            parsed.iter().map(|a| a.priority).collect::<Vec<_>>(),
            vec![Priority::High, Priority::High, Priority::Medium, Priority::Low]
        );
        assert_eq!(parsed[0].description, "Go to the pricing page");

        let actions: Vec<DiscoveredAction> = parsed
            .into_iter()
            .map(|p| action("cap1", &p.description, p.priority))
            .collect();
        assert!(actions.iter().all(|a| a.action_kind == ActionKind::Pending));
        assert!(actions.iter().all(|a| a.javascript.is_empty()));
    }

    #[test]
    fn missing_or_unrecognised_priority_defaults_to_medium() {
        let parsed = parse_response("Do a thing | bogus\nDo another thing");
        assert_eq!(parsed[0].priority, Priority::Medium);
        assert_eq!(parsed[1].priority, Priority::Medium);
    }

    #[test]
    fn empty_description_lines_are_discarded() {
        let parsed = parse_response("   | high\nReal action | low");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].description, "Real action");
    }

    #[test]
    fn scenario_s4_dedup_drops_the_similar_phrasing() {
        let existing = vec![action("cap1", "Sign in with your account", Priority::High)];
        let new = vec![
            action("cap1", "Sign in to your account", Priority::High),
            action("cap1", "View the pricing page", Priority::Medium),
        ];
        let kept = dedup(&existing, &new);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].description, "View the pricing page");
    }

    #[test]
    fn p6_similarity_is_symmetric() {
        let a = action("cap1", "Sign in with your account", Priority::High);
        let b = action("cap1", "Sign in to your account", Priority::High);
        assert_eq!(similar(&a, &b), similar(&b, &a));
    }

    #[test]
    fn r3_dedup_is_associative_across_batches() {
        let xs = vec![action("cap1", "Sign in with your account", Priority::High)];
        let ys = vec![action("cap1", "View the pricing page", Priority::Medium)];
        let zs = vec![action("cap1", "Sign in to your account", Priority::Low)];

        let left = dedup(&dedup(&xs, &ys), &zs);
        let mut ys_then_zs = ys.clone();
        ys_then_zs.extend(zs.clone());
        let right = dedup(&xs, &ys_then_zs);

        let left_descriptions: Vec<_> = left.iter().map(|a| &a.description).collect();
        let right_descriptions: Vec<_> = right.iter().map(|a| &a.description).collect();
        assert_eq!(left_descriptions, right_descriptions);
    }

    #[test]
    fn merge_sorts_by_priority_bucket_stably() {
        let existing = vec![action("cap1", "existing low one", Priority::Low)];
        let new = vec![
            action("cap1", "brand new high one", Priority::High),
            action("cap1", "brand new medium one", Priority::Medium),
        ];
        let merged = merge(&existing, &new);
        assert_eq!(
            merged.iter().map(|a| a.priority).collect::<Vec<_>>(),
            vec![Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn code_synthesis_parses_strict_json() {
        let raw = r#"{"selector": "#login", "action": "click", "javascript": "document.querySelector('#login').click()", "fallback": ""}"#;
        let result = parse_code_synthesis_response(raw);
        assert_eq!(result.selector, "#login");
        assert_eq!(result.javascript, "document.querySelector('#login').click()");
    }

    #[test]
    fn code_synthesis_tolerates_wrapped_malformed_json() {
        let raw = "Sure, here you go:\n{\"selector\": \"#go\", \"action\": \"click\" \"javascript\": \"clickIt()\", \"fallback\": \"\"}\nhope that helps";
        let result = parse_code_synthesis_response(raw);
        assert_eq!(result.selector, "#go");
        assert_eq!(result.javascript, "clickIt()");
    }

    #[test]
    fn resolve_javascript_falls_back_to_composed_template() {
        let empty = CodeSynthesisResult::default();
        let js = resolve_javascript(&empty, "Click the Start Sharing Now button");
        assert!(js.contains("querySelectorAll"));
        assert!(js.contains("start"));
    }
}
