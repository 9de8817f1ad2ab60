//! C3 — Page Differ. Fingerprints raw page HTML so the Poller can tell
//! "nothing changed" apart from "something did" without re-running Action
//! Discovery, and produces a short textual diff of what changed when it
//! did. Content-addressed via `blake3`, the same fast-hash-then-compare
//! shape the teacher uses for checkpoint identity in its SQLite runtime.

const INTERACTIVE_TAGS: &[&str] = &["<button", "<a ", "<input", "<select", "<textarea"];
const MAX_DIFF_SAMPLES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub html: String,
    pub fingerprint: String,
    pub timestamp_ms: i64,
}

/// Collapses runs of ASCII whitespace to a single space and trims the
/// ends, so two HTML documents that differ only in incidental
/// indentation/newlines fingerprint identically.
fn collapse_whitespace(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last_was_space = false;
    for c in html.chars() {
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
    out.trim().to_string()
}

fn fingerprint(html: &str) -> String {
    blake3::hash(collapse_whitespace(html).as_bytes()).to_hex().to_string()
}

/// Observes one page snapshot and reports whether it differs from the
/// previous one, if any. A matching fingerprint short-circuits to
/// "unchanged" (spec P5); `previous: None` always reports changed, so the
/// very first observation of a page is never silently dropped (spec B2).
pub fn observe(html: &str, timestamp_ms: i64, previous: Option<&PageSnapshot>) -> (bool, PageSnapshot) {
    let snapshot = PageSnapshot {
        html: html.to_owned(),
        fingerprint: fingerprint(html),
        timestamp_ms,
    };
    let changed = match previous {
        Some(prev) => prev.fingerprint != snapshot.fingerprint,
        None => true,
    };
    (changed, snapshot)
}

/// Textual diff between two raw-HTML observations (spec §4.3): if `new`
/// contains `old` verbatim, returns the suffix appended beyond the shared
/// prefix; otherwise returns up to `MAX_DIFF_SAMPLES` lines of `new` that
/// mention an interactive tag and whose exact text is absent from `old`.
pub fn diff(old: &str, new: &str) -> String {
    if let Some(prefix_len) = shared_prefix_if_containing(old, new) {
        return new[prefix_len..].to_string();
    }

    new.lines()
        .filter(|line| INTERACTIVE_TAGS.iter().any(|tag| line.contains(tag)))
        .filter(|line| !old.contains(line))
        .take(MAX_DIFF_SAMPLES)
        .collect::<Vec<_>>()
        .join("\n")
}

/// If `new` contains `old` verbatim as a substring, returns the byte
/// offset in `new` right after that occurrence of `old` — the point past
/// which everything is newly appended content.
fn shared_prefix_if_containing(old: &str, new: &str) -> Option<usize> {
    if old.is_empty() {
        return None;
    }
    new.find(old).map(|start| start + old.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p5_identical_html_never_changes() {
        let html = "<html><body><p>hi</p></body></html>";
        let (_, first) = observe(html, 0, None);
        let (changed, _) = observe(html, 100, Some(&first));
        assert!(!changed);
    }

    #[test]
    fn b2_first_observation_is_always_reported_changed() {
        let html = "<html><body><p>hi</p></body></html>";
        let (changed, _) = observe(html, 0, None);
        assert!(changed);
    }

    #[test]
    fn scenario_s2_added_button_is_reported_changed_with_diff() {
        let before = "<html><body><p>hi</p></body></html>";
        let (_, t0) = observe(before, 0, None);
        let (changed_same, t100) = observe(before, 100, Some(&t0));
        assert!(!changed_same);

        let after = "<html><body><p>hi</p><button>Buy</button></body></html>";
        let (changed, _t200) = observe(after, 200, Some(&t100));
        assert!(changed);

        let report = diff(&t100.html, after);
        assert!(report.lines().any(|line| line.contains("<button")));
    }

    #[test]
    fn diff_returns_appended_suffix_when_new_contains_old_verbatim() {
        let old = "<html><body>base</body></html>";
        let new = format!("{old}<script>more()</script>");
        let report = diff(old, &new);
        assert_eq!(report, "<script>more()</script>");
    }

    #[test]
    fn diff_caps_samples_at_ten() {
        let old = "<html><body>different</body></html>\n";
        let mut new = String::from("<html><body>\n");
        for i in 0..20 {
            new.push_str(&format!("<button>Item {i}</button>\n"));
        }
        new.push_str("</body></html>\n");
        let report = diff(old, &new);
        assert_eq!(report.lines().count(), MAX_DIFF_SAMPLES);
    }
}
