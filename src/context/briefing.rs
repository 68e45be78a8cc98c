//! Renders the UI-state briefing prepended to the user prompt.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::{ContextPackage, DomElementSnapshot};

/// Interactive elements described narratively.
const MAX_DESCRIBED_ELEMENTS: usize = 20;
/// Element ids listed for highlighting.
const MAX_AVAILABLE_IDS: usize = 30;
/// Elements scanned for keyword selectors and text previews.
const MAX_INDEXED_ELEMENTS: usize = 40;
/// Ids shown inline before the list is elided.
const MAX_RENDERED_IDS: usize = 15;
/// Text previews rendered in the briefing.
const MAX_RENDERED_PREVIEWS: usize = 5;

const KEYWORDS: [&str; 12] = [
    "comment", "post", "tag", "user", "search", "create", "export", "filter", "title", "body",
    "summary", "misc",
];

const FALLBACK_ROUTES: &str = "/posts, /comments, /tags, /users, /";

/// Build the full enriched prompt: briefing, then the user request, then
/// a closing reminder about the action-block contract.
pub fn build_prompt(package: &ContextPackage) -> String {
    format!(
        "{}\n\nUser request: {}\n\nRemember: if the user asks to navigate, highlight, or show \
         something, you MUST include an [ACTIONS] block at the end of your response.",
        render_briefing(package),
        package.prompt
    )
}

/// Render the page-state briefing. Enumeration is bounded to cap prompt
/// size; the bounds are not correctness-critical.
pub fn render_briefing(package: &ContextPackage) -> String {
    let interactive: Vec<&DomElementSnapshot> = package
        .dom_snapshot
        .iter()
        .filter(|el| el.is_interactive)
        .collect();
    let with_ids: Vec<&DomElementSnapshot> = package
        .dom_snapshot
        .iter()
        .filter(|el| !el.id.trim().is_empty() && el.id != "root")
        .collect();

    let page = &package.page_context;
    let mut out = String::new();
    let _ = writeln!(out, "## Web application state");
    let _ = writeln!(out);
    let _ = writeln!(out, "Current page:");
    let _ = writeln!(out, "  - path: {}", page.path);
    let _ = writeln!(out, "  - title: {}", page.title);
    let _ = writeln!(
        out,
        "  - url: {}{}{}",
        page.path, page.query, page.fragment
    );

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Interactive elements ({} visible):",
        interactive.len()
    );
    for element in interactive.iter().take(MAX_DESCRIBED_ELEMENTS) {
        let _ = writeln!(out, "  - {}", describe_element(element));
    }

    let available_ids: Vec<String> = with_ids
        .iter()
        .take(MAX_AVAILABLE_IDS)
        .map(|el| el.id.clone())
        .collect();
    if !available_ids.is_empty() {
        let shown = available_ids
            .iter()
            .take(MAX_RENDERED_IDS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let ellipsis = if available_ids.len() > MAX_RENDERED_IDS {
            "..."
        } else {
            ""
        };
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Element ids available for highlighting: {shown}{ellipsis}"
        );
    }

    let keyword_selectors = keyword_selectors(&with_ids);
    if !keyword_selectors.is_empty() {
        let rendered = keyword_selectors
            .iter()
            .map(|(keyword, selectors)| {
                format!(
                    "{}: {}",
                    keyword,
                    selectors
                        .iter()
                        .take(3)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        let _ = writeln!(out);
        let _ = writeln!(out, "Quick selectors by keyword: {rendered}");
    }

    let previews = text_previews(&with_ids);
    if !previews.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Text previews:");
        for (id, preview) in previews.iter().take(MAX_RENDERED_PREVIEWS) {
            let _ = writeln!(out, "  - #{id}: {preview}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Available routes: {}", available_routes(package));

    if let Some(walkthrough) = &package.walkthrough {
        let _ = writeln!(out);
        let _ = writeln!(out, "Active walkthrough: {}", walkthrough.id);
        let _ = writeln!(
            out,
            "Current step: {} of {}",
            walkthrough.step_index + 1,
            walkthrough.step_count
        );
        let _ = writeln!(
            out,
            "Step details: {}",
            serde_json::to_string(&walkthrough.step_detail).unwrap_or_default()
        );
    }

    let _ = writeln!(out);
    out.push_str(INSTRUCTIONS);
    out.trim_end().to_string()
}

fn describe_element(element: &DomElementSnapshot) -> String {
    let mut parts = Vec::new();
    if element.id.is_empty() {
        parts.push(element.tag_name.clone());
    } else {
        parts.push(format!("#{}", element.id));
    }
    if let Some(label) = element.aria_label.as_deref().filter(|l| !l.is_empty()) {
        parts.push(format!("\"{label}\""));
    } else if !element.text_content.is_empty() {
        let truncated: String = element.text_content.chars().take(50).collect();
        parts.push(format!("\"{truncated}\""));
    }
    if let Some(role) = element.role.as_deref().filter(|r| !r.is_empty()) {
        parts.push(format!("({role})"));
    }
    parts.join(" ")
}

fn keyword_selectors(with_ids: &[&DomElementSnapshot]) -> BTreeMap<&'static str, Vec<String>> {
    let mut map: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    for element in with_ids.iter().take(MAX_INDEXED_ELEMENTS) {
        let id_lower = element.id.to_lowercase();
        let text_lower = element.text_content.to_lowercase();
        for keyword in KEYWORDS {
            if id_lower.contains(keyword) || text_lower.contains(keyword) {
                let selector = format!("#{}", element.id);
                let entry = map.entry(keyword).or_default();
                if !entry.contains(&selector) {
                    entry.push(selector);
                }
            }
        }
    }
    map
}

fn text_previews(with_ids: &[&DomElementSnapshot]) -> Vec<(String, String)> {
    with_ids
        .iter()
        .take(MAX_INDEXED_ELEMENTS)
        .filter_map(|element| {
            let text = element.text_content.trim();
            if text.is_empty() {
                return None;
            }
            let preview: String = text.chars().take(200).collect::<String>().replace('\n', " ");
            Some((element.id.clone(), preview))
        })
        .collect()
}

fn available_routes(package: &ContextPackage) -> String {
    if package.page_context.path == "/" {
        return "/, /features, /about".to_string();
    }
    let mut routes: Vec<String> = Vec::new();
    for element in package.dom_snapshot.iter().filter(|el| el.is_interactive) {
        let is_link =
            element.role.as_deref() == Some("link") || element.tag_name.eq_ignore_ascii_case("a");
        if !is_link {
            continue;
        }
        let Some(href) = element.href.as_deref() else {
            continue;
        };
        if !href.starts_with('/') {
            continue;
        }
        let route = href
            .split(['?', '#'])
            .next()
            .unwrap_or(href)
            .to_string();
        if !routes.contains(&route) {
            routes.push(route);
        }
    }
    if routes.is_empty() {
        FALLBACK_ROUTES.to_string()
    } else {
        routes.join(", ")
    }
}

const INSTRUCTIONS: &str = "\
Your capabilities:
  - You can see what the user sees on the page and reference elements by id.
  - You can help users navigate and complete tasks, and trigger UI actions.

Navigation and highlighting:
  When the user asks to navigate, highlight, or see a section, respond
  conversationally and ALWAYS append an [ACTIONS] block at the END of your
  response (it is hidden from the user):

  [ACTIONS]
  {\"navigate\": \"/path\", \"highlight\": [\"selector1\", \"selector2\"]}
  [/ACTIONS]

  - Use CSS selectors (\"#element-id\", \".class-name\", \"tag-name\") and try
    several candidates when unsure.
  - If the requested section lives on another page, navigate there first.
  - When asked to read or quote page text, locate the element, quote the
    text verbatim, and optionally highlight it afterwards.

  Examples:
    User: \"highlight comments\" -> \"I'll highlight the comments section!\" \
[ACTIONS]{\"highlight\": [\"#comments\", \"comments\"]}[/ACTIONS]
    User: \"go to tags\" -> \"Let me show you the tags section.\" \
[ACTIONS]{\"navigate\": \"/tags\", \"highlight\": [\"#tags\"]}[/ACTIONS]

General style:
  - Natural, conversational, friendly tone; concise but not terse.
  - Take action immediately rather than describing what you would do.
  - If the user is in a walkthrough, help them complete the current step.";
