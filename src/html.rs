//! HTML-to-text conversion for newsletter bodies.
//!
//! Newsletters arrive as heavily nested marketing HTML. This module strips
//! the markup into readable plain text: script/style subtrees are dropped,
//! block-level elements become line breaks, and whitespace is collapsed so
//! the chunker sees prose rather than layout noise.

use scraper::{ElementRef, Html};

/// Elements whose entire subtree carries no readable text.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head", "title", "noscript", "svg", "iframe"];

/// Elements that imply a line break around their content.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "table", "tr", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "section", "article", "header", "footer", "hr",
];

/// Strip HTML structure into plain text.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    collect_text(document.root_element(), &mut out);
    collapse_whitespace(&out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            let is_block = BLOCK_ELEMENTS.contains(&name);
            if is_block {
                out.push('\n');
            }
            collect_text(child_el, out);
            if is_block {
                out.push('\n');
            }
        }
    }
}

/// Collapse runs of spaces within lines and runs of blank lines between
/// paragraphs, trimming the result.
fn collapse_whitespace(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_pending = false;

    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_pending = !lines.is_empty();
            continue;
        }
        if blank_pending {
            lines.push(String::new());
            blank_pending = false;
        }
        lines.push(collapsed);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags() {
        let text = html_to_text("<p>Hello</p>");
        assert_eq!(text, "Hello");
    }

    #[test]
    fn drops_script_and_style() {
        let html = "<html><head><style>p { color: red; }</style></head>\
                    <body><script>alert('x')</script><p>Visible</p></body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "Visible");
        assert!(!text.contains("alert"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn block_elements_become_paragraphs() {
        let html = "<div>First</div><div>Second</div>";
        let text = html_to_text(html);
        assert_eq!(text, "First\n\nSecond");
    }

    #[test]
    fn inline_elements_stay_on_one_line() {
        let html = "<p>Read <a href=\"x\">this link</a> today</p>";
        let text = html_to_text(html);
        assert_eq!(text, "Read this link today");
    }

    #[test]
    fn collapses_whitespace_runs() {
        let html = "<p>Too    many\t spaces</p>\n\n\n<p>Next</p>";
        let text = html_to_text(html);
        assert!(text.contains("Too many spaces"));
        assert!(!text.contains("  "));
    }

    #[test]
    fn decodes_entities() {
        let text = html_to_text("<p>Fish &amp; Chips</p>");
        assert_eq!(text, "Fish & Chips");
    }

    #[test]
    fn plain_text_passes_through() {
        let text = html_to_text("no markup at all");
        assert_eq!(text, "no markup at all");
    }
}
