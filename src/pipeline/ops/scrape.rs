use serde_json::{Value as JsonValue, json};

use crate::errors::pipeline::PipelineError;

use super::{Execution, OpKind, ScrapeParams, navigate, prepare_page};

pub async fn run(exec: Execution<'_>, params: &ScrapeParams) -> Result<JsonValue, PipelineError> {
    prepare_page(exec.page(), OpKind::Scrape, None).await?;
    navigate(exec.page(), &params.url, OpKind::Scrape, params.wait_time).await?;

    let mut elements = Vec::with_capacity(params.elements.len());
    let mut found = 0usize;
    for spec in &params.elements {
        let attributes = spec.attributes.clone().unwrap_or_default();
        let value = exec
            .page()
            .query_elements(&spec.selector, &attributes)
            .await
            .map_err(|e| PipelineError::OpFailed(e.to_string()))?;
        if let JsonValue::Array(items) = &value {
            found += items.len();
        }
        elements.push(json!({ "selector": spec.selector, "results": value }));
    }

    Ok(json!({
        "elements": elements,
        "metadata": { "elementsFound": found },
    }))
}
