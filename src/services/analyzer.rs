use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::fallback;
use crate::services::model_client::ModelClient;

/// The analyzer only ever sends this much of a document upstream.
pub(crate) const SNIPPET_CAP: usize = 4000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct TextAnalysis {
    pub(crate) summary: String,
    pub(crate) vocabulary: String,
    pub(crate) grammar: String,
    pub(crate) action_points: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) difficulty: Option<String>,
}

pub(crate) fn snippet_of(text: &str) -> String {
    text.chars().take(SNIPPET_CAP).collect()
}

/// AI document feedback with the heuristic analyzer as the substitute. The
/// bool is true when the fallback produced the result.
pub(crate) async fn analyze_text(
    model: &ModelClient,
    text: &str,
    custom_prompt: Option<&str>,
) -> (TextAnalysis, bool) {
    let snippet = snippet_of(text);

    let instructions = "Provide a JSON object with keys summary, vocabulary, grammar, \
        action_points. Each value should be short strings or bullet-like sentences.";
    let user_content = format!(
        "Student material:\n{snippet}\n\nFocus: {}",
        custom_prompt.unwrap_or("Highlight strengths and improvements.")
    );

    match model.complete_json(instructions, &user_content, 0.4).await {
        Ok(value) => (analysis_from_value(&value), false),
        Err(err) => {
            tracing::warn!(error = %err, "AI analyzer unavailable, using local analysis");
            (fallback::local_text_analysis(&snippet, custom_prompt), true)
        }
    }
}

fn analysis_from_value(value: &Value) -> TextAnalysis {
    let field = |key: &str, default: &str| {
        value.get(key).and_then(Value::as_str).unwrap_or(default).to_string()
    };

    TextAnalysis {
        summary: field("summary", "No summary produced."),
        vocabulary: field("vocabulary", ""),
        grammar: field("grammar", ""),
        action_points: field("action_points", ""),
        difficulty: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analysis_defaults_missing_fields() {
        let value = json!({"summary": "Good work"});
        let analysis = analysis_from_value(&value);
        assert_eq!(analysis.summary, "Good work");
        assert_eq!(analysis.vocabulary, "");
        assert!(analysis.difficulty.is_none());
    }

    #[test]
    fn snippet_is_capped() {
        let text = "a".repeat(SNIPPET_CAP + 100);
        assert_eq!(snippet_of(&text).chars().count(), SNIPPET_CAP);
    }
}
