use serde_json::{Value as JsonValue, json};

use crate::errors::pipeline::PipelineError;

use super::{Execution, LinksParams, OpKind, is_internal, navigate, normalize_host, prepare_page};

pub async fn run(exec: Execution<'_>, params: &LinksParams) -> Result<JsonValue, PipelineError> {
    prepare_page(exec.page(), OpKind::Links, None).await?;
    navigate(exec.page(), &params.url, OpKind::Links, params.wait_time).await?;

    let raw_links = exec
        .page()
        .extract_links()
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?;

    let base_host = normalize_host(&params.url).unwrap_or_default();
    let include_external = params.include_external.unwrap_or(true);
    let visible_only = params.visible_links_only.unwrap_or(false);

    let mut internal_count = 0usize;
    let mut external_count = 0usize;
    let mut links = Vec::new();

    for link in raw_links {
        if visible_only && !link.visible {
            continue;
        }
        let internal = is_internal(&link.href, &base_host);
        if internal {
            internal_count += 1;
        } else {
            external_count += 1;
            if !include_external {
                continue;
            }
        }
        links.push(json!({
            "url": link.href,
            "text": link.text,
            "type": if internal { "internal" } else { "external" },
        }));
    }

    Ok(json!({
        "links": links,
        "metadata": {
            "url": params.url,
            "totalLinks": internal_count + external_count,
            "internalLinks": internal_count,
            "externalLinks": external_count,
        },
    }))
}
