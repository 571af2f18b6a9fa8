use axum::extract::{Multipart, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::schemas::analyze::AnalyzeResponse;
use crate::services::{analyzer, extract, fallback};

const SAMPLE_TEXT_LEN: usize = 1200;

/// Document analysis: multipart upload with a `document` file and an
/// optional `prompt` field. Extraction failures are the caller's fault;
/// model trouble silently switches to the heuristic analyzer.
pub(crate) async fn analyze(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let mut custom_prompt: Option<String> = None;
    let mut document: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {e}")))?
    {
        match field.name() {
            Some("prompt") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid prompt field: {e}")))?;
                let text = text.trim().to_string();
                if !text.is_empty() {
                    custom_prompt = Some(text);
                }
            }
            Some("document") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid document field: {e}")))?;
                document = Some((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    let Some((filename, data)) = document else {
        return Err(ApiError::BadRequest("Please choose a file to upload.".to_string()));
    };

    let max_bytes = state.settings().upload().max_upload_size_mb * 1024 * 1024;
    if data.len() as u64 > max_bytes {
        return Err(ApiError::BadRequest(format!(
            "File exceeds the {} MB upload limit",
            state.settings().upload().max_upload_size_mb
        )));
    }

    let text = extract::extract_text(
        &filename,
        &data,
        &state.settings().upload().allowed_document_extensions,
    )
    .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let (analysis, used_fallback) =
        analyzer::analyze_text(state.model(), &text, custom_prompt.as_deref()).await;
    let stats = fallback::text_stats(&text);

    tracing::info!(
        user_id = %user.id,
        filename = %filename,
        words = stats.word_count,
        fallback = used_fallback,
        action = "document_analyze",
        "Document analyzed"
    );

    Ok(Json(AnalyzeResponse {
        analysis,
        sample_text: text.chars().take(SAMPLE_TEXT_LEN).collect(),
        word_count: stats.word_count,
        sentence_count: stats.sentence_count,
        fallback: used_fallback,
        notice: used_fallback
            .then(|| "AI analyzer offline. Showing heuristic feedback instead.".to_string()),
    }))
}
