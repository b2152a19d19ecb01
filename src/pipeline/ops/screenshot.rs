use serde_json::{Value as JsonValue, json};

use crate::errors::pipeline::PipelineError;

use super::{Execution, OpKind, ScreenshotParams, navigate, prepare_page};

pub async fn run(exec: Execution<'_>, params: &ScreenshotParams) -> Result<JsonValue, PipelineError> {
    prepare_page(exec.page(), OpKind::Screenshot, params.viewport).await?;
    navigate(exec.page(), &params.url, OpKind::Screenshot, params.wait_time).await?;

    let format = params.format.clone().unwrap_or_else(|| "png".to_string());
    let bytes = exec
        .page()
        .screenshot(&format, params.quality, params.selector.as_deref())
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?;

    Ok(json!({
        "body": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes),
        "metadata": { "url": params.url, "size": bytes.len(), "format": format },
    }))
}
