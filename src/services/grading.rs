use serde_json::Value;

use crate::services::fallback;
use crate::services::model_client::{ChatMessage, ModelClient};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextEvaluation {
    pub(crate) is_correct: bool,
    pub(crate) feedback: String,
    pub(crate) explanation: String,
    /// Similarity score, present only when the fallback grader ran.
    pub(crate) similarity: Option<f64>,
}

/// Judge a free-text answer. The model acts as the teacher when reachable;
/// otherwise the deterministic similarity grader decides.
pub(crate) async fn evaluate_text_answer(
    model: &ModelClient,
    prompt: &str,
    reference: &str,
    submission: &str,
) -> TextEvaluation {
    let submission = submission.trim();
    let reference = reference.trim();

    if submission.is_empty() {
        return TextEvaluation {
            is_correct: false,
            feedback: "No answer submitted.".to_string(),
            explanation: "Please provide a response so we can review it.".to_string(),
            similarity: None,
        };
    }

    let base = fallback_evaluation(reference, submission);

    let system = "You are an English teacher. Strictly reply with a JSON object \
        like {\"is_correct\": bool, \"feedback\": \"...\", \"explanation\": \"...\"}";
    let user = format!(
        "Question: {prompt}\nExpected answer: {reference}\n\
         Student answer: {submission}\nJudge correctness for an exam."
    );

    match model.complete_json(system, &user, 0.2).await {
        Ok(value) => TextEvaluation {
            is_correct: value.get("is_correct").and_then(Value::as_bool).unwrap_or(false),
            feedback: value
                .get("feedback")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .unwrap_or(&base.feedback)
                .to_string(),
            explanation: value
                .get("explanation")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            similarity: None,
        },
        Err(err) => {
            tracing::warn!(error = %err, "AI grading failed, using similarity grader");
            base
        }
    }
}

fn fallback_evaluation(reference: &str, submission: &str) -> TextEvaluation {
    let grade = fallback::grade_translation(submission, reference);
    TextEvaluation {
        is_correct: grade.passed,
        feedback: if grade.passed {
            "Looks good! Keep it up.".to_string()
        } else {
            format!("Expected: {reference}")
        },
        explanation: String::new(),
        similarity: Some(grade.score),
    }
}

/// Condensed teacher-facing summary of a finished attempt. Best effort: any
/// model trouble means no summary, never an error.
pub(crate) async fn summarize_attempt_for_teacher(
    model: &ModelClient,
    exam_title: &str,
    answers: &[Value],
) -> Option<String> {
    if answers.is_empty() {
        return None;
    }

    let serialized = answers
        .iter()
        .map(|answer| {
            format!(
                "Q: {} | Student: {} | Correct: {} | Result: {} | Feedback: {}",
                answer.get("prompt").and_then(Value::as_str).unwrap_or(""),
                answer.get("selected").and_then(Value::as_str).unwrap_or(""),
                answer.get("correct_answer").and_then(Value::as_str).unwrap_or(""),
                answer.get("is_correct").and_then(Value::as_bool).unwrap_or(false),
                answer.get("feedback").and_then(Value::as_str).unwrap_or(""),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let messages = [
        ChatMessage::system(
            "You are a concise English teacher assistant. Summarize performance \
             for another teacher in <=4 sentences.",
        ),
        ChatMessage::user(format!("Exam: {exam_title}\nDetails:\n{serialized}")),
    ];

    match model.complete(&messages, 0.3).await {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(error = %err, "Attempt summary failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn offline_model() -> ModelClient {
        test_support::set_test_env();
        test_support::offline_model()
    }

    #[tokio::test]
    async fn empty_submission_short_circuits() {
        let _guard = test_support::env_lock().await;
        let model = offline_model();
        let result = evaluate_text_answer(&model, "Translate.", "Hello.", "   ").await;
        assert!(!result.is_correct);
        assert_eq!(result.feedback, "No answer submitted.");
        assert!(result.similarity.is_none());
    }

    #[tokio::test]
    async fn offline_grading_is_deterministic() {
        let _guard = test_support::env_lock().await;
        let model = offline_model();
        let first =
            evaluate_text_answer(&model, "Translate.", "I learn new words every day.", "i learn new words every day.")
                .await;
        let second =
            evaluate_text_answer(&model, "Translate.", "I learn new words every day.", "i learn new words every day.")
                .await;
        assert_eq!(first, second);
        assert!(first.is_correct);
        assert_eq!(first.similarity, Some(1.0));
    }

    #[tokio::test]
    async fn offline_grading_reports_expected_answer() {
        let _guard = test_support::env_lock().await;
        let model = offline_model();
        let result =
            evaluate_text_answer(&model, "Translate.", "She passed the exam.", "bananas").await;
        assert!(!result.is_correct);
        assert!(result.feedback.contains("Expected: She passed the exam."));
    }

    #[tokio::test]
    async fn summary_skips_empty_answer_sets() {
        let _guard = test_support::env_lock().await;
        let model = offline_model();
        assert!(summarize_attempt_for_teacher(&model, "Midterm", &[]).await.is_none());
    }
}
