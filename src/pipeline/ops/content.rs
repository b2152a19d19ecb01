use serde_json::{Value as JsonValue, json};

use crate::errors::pipeline::PipelineError;

use super::{ContentParams, Execution, OpKind, navigate, prepare_page};

pub async fn run(exec: Execution<'_>, params: &ContentParams) -> Result<JsonValue, PipelineError> {
    prepare_page(exec.page(), OpKind::Content, None).await?;
    navigate(exec.page(), &params.url, OpKind::Content, params.wait_time).await?;

    let html = exec
        .page()
        .content_html()
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?;

    Ok(json!({
        "content": html,
        "metadata": { "url": params.url },
    }))
}
