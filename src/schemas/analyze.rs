use serde::Serialize;

use crate::services::analyzer::TextAnalysis;

#[derive(Debug, Serialize)]
pub(crate) struct AnalyzeResponse {
    pub(crate) analysis: TextAnalysis,
    /// Opening slice of the extracted text, for the upload preview.
    pub(crate) sample_text: String,
    pub(crate) word_count: usize,
    pub(crate) sentence_count: usize,
    pub(crate) fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) notice: Option<String>,
}
