//! Markup to plain-text conversion for best-effort scraping.
//!
//! Walks the parsed DOM and keeps visible text nodes one per line, skipping
//! `<script>`, `<style>` and `<noscript>` bodies.

use scraper::{Html, Node, Selector};

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Payloads below this size are never a real landing page.
const MIN_PLAUSIBLE_LEN: usize = 1_000;
/// Obfuscated challenge pages are small; real pages with inline `Function(`
/// calls are not.
const MAX_CHALLENGE_LEN: usize = 10_000;

/// Convert markup to trimmed, non-empty text lines joined by `\n`.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()));
        if hidden {
            continue;
        }

        lines.extend(text.split('\n').map(str::trim).filter(|l| !l.is_empty()));
    }

    lines.join("\n")
}

/// Bodies of every `<script>` element, in document order.
pub fn script_blocks(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Returns `true` if the payload looks like an anti-bot challenge rather
/// than the page we asked for.
pub fn looks_bot_protected(body: &str) -> bool {
    let scripted = body.contains("Function(");
    (scripted && body.contains("obfuscated"))
        || (scripted && body.len() < MAX_CHALLENGE_LEN)
        || body.len() < MIN_PLAUSIBLE_LEN
}
