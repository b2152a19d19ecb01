use ego_tree::NodeRef;
use scraper::{Html, Node};
use serde_json::{Value as JsonValue, json};

use crate::errors::pipeline::PipelineError;

use super::{Execution, MarkdownParams, OpKind, navigate, prepare_page};

pub async fn run(exec: Execution<'_>, params: &MarkdownParams) -> Result<JsonValue, PipelineError> {
    prepare_page(exec.page(), OpKind::Markdown, None).await?;
    navigate(exec.page(), &params.url, OpKind::Markdown, params.wait_time).await?;

    let html = exec
        .page()
        .content_html()
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?;

    let markdown = html_to_markdown(&html);
    let word_count = markdown.split_whitespace().count();

    Ok(json!({
        "markdown": markdown,
        "metadata": { "url": params.url, "wordCount": word_count },
    }))
}

/// Flattens a parsed document into a readable markdown approximation:
/// headings become `#` runs, paragraphs/list items become lines, anchors
/// keep their `[text](href)` shape. Not a full CommonMark round trip --
/// good enough for the extraction/LLM-input use cases this feeds.
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    render_children(document.tree.root(), &mut out);
    collapse_blank_lines(out.trim())
}

fn render_children(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        render_node(child, out);
    }
}

fn render_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Element(el) => {
            let tag = el.name();
            match tag {
                "script" | "style" | "noscript" | "head" => {}
                "br" => out.push('\n'),
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let level = tag[1..].parse::<usize>().unwrap_or(1);
                    out.push_str(&format!("\n{} ", "#".repeat(level)));
                    render_children(node, out);
                    out.push('\n');
                }
                "a" => {
                    let href = el.attr("href").unwrap_or("");
                    let mut text = String::new();
                    render_children(node, &mut text);
                    let text = text.trim();
                    if href.is_empty() || text.is_empty() {
                        out.push_str(text);
                    } else {
                        out.push_str(&format!("[{text}]({href})"));
                    }
                }
                "li" => {
                    out.push_str("\n- ");
                    render_children(node, out);
                }
                "p" | "div" | "section" | "article" | "tr" => {
                    out.push('\n');
                    render_children(node, out);
                    out.push('\n');
                }
                _ => render_children(node, out),
            }
        }
        Node::Text(text) => {
            let collapsed = text.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !collapsed.is_empty() {
                if !out.ends_with(['\n', ' ']) && !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&collapsed);
            }
        }
        _ => {}
    }
}

fn collapse_blank_lines(input: &str) -> String {
    let mut out = String::new();
    let mut blank_run = 0;
    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run <= 1 {
                out.push('\n');
            }
        } else {
            blank_run = 0;
            out.push_str(trimmed);
            out.push('\n');
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_heading_and_paragraph() {
        let md = html_to_markdown("<html><body><h1>Title</h1><p>Hello world</p></body></html>");
        assert!(md.contains("# Title"));
        assert!(md.contains("Hello world"));
    }

    #[test]
    fn keeps_link_shape() {
        let md = html_to_markdown(r#"<a href="https://example.com">example</a>"#);
        assert_eq!(md, "[example](https://example.com)");
    }

    #[test]
    fn drops_script_content() {
        let md = html_to_markdown("<script>evil()</script><p>safe</p>");
        assert!(!md.contains("evil"));
        assert!(md.contains("safe"));
    }
}
