use serde_json::{Value as JsonValue, json};

use crate::errors::pipeline::PipelineError;

use super::{Execution, OpKind, PdfParams, navigate, prepare_page};

pub async fn run(exec: Execution<'_>, params: &PdfParams) -> Result<JsonValue, PipelineError> {
    prepare_page(exec.page(), OpKind::Pdf, None).await?;
    navigate(exec.page(), &params.url, OpKind::Pdf, params.wait_time).await?;

    let format = params.format.clone().unwrap_or_else(|| "A4".to_string());
    let bytes = exec
        .page()
        .pdf(&format)
        .await
        .map_err(|e| PipelineError::OpFailed(e.to_string()))?;

    Ok(json!({
        "body": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes),
        "metadata": { "url": params.url, "size": bytes.len() },
    }))
}
