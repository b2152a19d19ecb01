//! `jsonExtraction` (spec §4.6): markdown-ify the page, then ask an LLM to
//! produce JSON (or free text) under a token budget, with a fallback model
//! and a JSON-repair ladder for near-miss responses.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value as JsonValue, json};

use crate::errors::pipeline::PipelineError;

use super::{Execution, JsonExtractionParams, MarkdownParams, markdown};

const PRIMARY_CONTEXT_LIMIT: usize = 32_000;
const SECONDARY_CONTEXT_LIMIT: usize = 8_000;
const MAX_OUTPUT_TOKENS: usize = 2_048;
const SYSTEM_BUFFER: usize = 512;
/// Rough token estimate: the reference system tokenizes properly; this core
/// only needs a stable, cheap upper bound for truncation.
const CHARS_PER_TOKEN: usize = 4;

pub async fn run(exec: Execution<'_>, params: &JsonExtractionParams) -> Result<JsonValue, PipelineError> {
    let md_params = MarkdownParams {
        url: params.url.clone(),
        wait_time: params.wait_time,
    };
    let md = markdown::run(exec, &md_params).await?;
    let content = md["markdown"].as_str().unwrap_or_default();

    let response_type = params.response_type.as_deref().unwrap_or("json");
    let system_prompt = build_system_prompt(params, response_type);

    let primary_input = truncate_to_budget(content, PRIMARY_CONTEXT_LIMIT);
    let primary_result = call_llm(exec, &system_prompt, &primary_input, exec.settings.gemini_api_key.as_deref()).await;

    let raw_output = match primary_result {
        Ok(text) => text,
        Err(primary_err) => {
            let secondary_input = truncate_to_budget(content, SECONDARY_CONTEXT_LIMIT);
            call_llm(
                exec,
                &system_prompt,
                &secondary_input,
                exec.settings.cloudflare_ai_model.as_deref(),
            )
            .await
            .map_err(|secondary_err| {
                PipelineError::ExtractionFailed(format!(
                    "primary: {primary_err}; secondary: {secondary_err}"
                ))
            })?
        }
    };

    if response_type == "text" {
        return Ok(json!({
            "text": raw_output,
            "metadata": { "url": params.url },
        }));
    }

    let extracted = parse_json_with_fallbacks(&raw_output)
        .ok_or_else(|| PipelineError::ExtractionFailed("model output was not valid JSON".into()))?;

    Ok(json!({
        "extracted": extracted,
        "metadata": { "url": params.url },
    }))
}

fn build_system_prompt(params: &JsonExtractionParams, response_type: &str) -> String {
    let mut prompt = match response_type {
        "text" => "Answer the user's request in plain text using only the provided page content.".to_string(),
        _ => "Extract the requested information from the page content and respond with JSON only, no prose, no code fences.".to_string(),
    };
    if let Some(instructions) = &params.instructions {
        prompt.push_str("\n\nInstructions: ");
        prompt.push_str(instructions);
    }
    if let Some(user_prompt) = &params.prompt {
        prompt.push_str("\n\nRequest: ");
        prompt.push_str(user_prompt);
    }
    if let Some(schema) = &params.response_format {
        prompt.push_str("\n\nRespond matching this JSON shape: ");
        prompt.push_str(&schema.to_string());
    }
    prompt
}

fn truncate_to_budget(content: &str, context_limit: usize) -> String {
    let budget_tokens = context_limit.saturating_sub(MAX_OUTPUT_TOKENS + SYSTEM_BUFFER);
    let budget_chars = budget_tokens * CHARS_PER_TOKEN;
    if content.len() <= budget_chars {
        return content.to_string();
    }
    // Truncate section-by-section on paragraph boundaries rather than mid-word.
    let mut out = String::with_capacity(budget_chars);
    for section in content.split("\n\n") {
        if out.len() + section.len() + 2 > budget_chars {
            break;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(section);
    }
    if out.is_empty() {
        out.push_str(&content[..budget_chars.min(content.len())]);
    }
    out
}

async fn call_llm(
    exec: Execution<'_>,
    system_prompt: &str,
    content: &str,
    api_key: Option<&str>,
) -> Result<String, PipelineError> {
    let api_key = api_key.ok_or_else(|| PipelineError::OpFailed("no LLM credential configured".into()))?;

    let body = json!({
        "contents": [{
            "parts": [{ "text": format!("{system_prompt}\n\n---\n\n{content}") }]
        }]
    });

    let response = exec
        .http
        .post("https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent")
        .query(&[("key", api_key)])
        .json(&body)
        .send()
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?
        .error_for_status()
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?
        .json::<JsonValue>()
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?;

    response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PipelineError::OpFailed("empty completion".into()))
}

static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());
static OBJECT_LITERAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Strict parse, then: (i) strip fenced code blocks, (ii) balanced-brace
/// extraction respecting string escapes, (iii) a loose object-literal regex.
/// First strategy to yield valid JSON wins (spec §4.6).
fn parse_json_with_fallbacks(raw: &str) -> Option<JsonValue> {
    if let Ok(v) = serde_json::from_str(raw) {
        return Some(v);
    }

    if let Some(caps) = FENCE_RE.captures(raw) {
        if let Ok(v) = serde_json::from_str(&caps[1]) {
            return Some(v);
        }
    }

    if let Some(balanced) = extract_balanced_object(raw) {
        if let Ok(v) = serde_json::from_str(&balanced) {
            return Some(v);
        }
    }

    if let Some(m) = OBJECT_LITERAL_RE.find(raw) {
        if let Ok(v) = serde_json::from_str(m.as_str()) {
            return Some(v);
        }
    }

    None
}

/// Brace-counting scan for the outermost balanced `{...}`, ignoring braces
/// inside (possibly escaped) string literals.
fn extract_balanced_object(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let start = raw.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_json() {
        assert_eq!(
            parse_json_with_fallbacks(r#"{"a":1}"#),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn strips_fenced_code_block() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(parse_json_with_fallbacks(raw), Some(json!({"a": 1})));
    }

    #[test]
    fn extracts_balanced_object_with_prose_around_it() {
        let raw = r#"Sure, here you go: {"a": {"b": 1}} -- hope that helps!"#;
        assert_eq!(parse_json_with_fallbacks(raw), Some(json!({"a": {"b": 1}})));
    }

    #[test]
    fn balanced_extraction_ignores_braces_in_strings() {
        let raw = r#"noise {"text": "a } b { c"} trailing"#;
        let result = parse_json_with_fallbacks(raw).unwrap();
        assert_eq!(result["text"], json!("a } b { c"));
    }

    #[test]
    fn truncation_keeps_paragraph_boundaries() {
        let content = "first paragraph\n\nsecond paragraph\n\nthird paragraph";
        let truncated = truncate_to_budget(content, PRIMARY_CONTEXT_LIMIT);
        assert_eq!(truncated, content);
    }
}
