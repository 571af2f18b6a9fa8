use serde_json::Value;

use crate::db::types::{AnswerType, Category};
use crate::services::model_client::ModelClient;
use crate::services::{fallback, web_search};

const MAX_PROMPT_LEN: usize = 400;
const MAX_ANSWER_LEN: usize = 200;
const MAX_REFERENCE_LEN: usize = 300;
const MAX_TITLE_LEN: usize = 80;
const MAX_DESCRIPTION_LEN: usize = 200;

const MIN_QUESTIONS: i64 = 3;
const MAX_QUESTIONS: i64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionDraft {
    pub(crate) prompt: String,
    pub(crate) answer_type: AnswerType,
    pub(crate) correct_answer: Option<String>,
    pub(crate) wrong1: Option<String>,
    pub(crate) wrong2: Option<String>,
    pub(crate) wrong3: Option<String>,
    pub(crate) reference_answer: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ExamBlueprint {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) category: Category,
    pub(crate) question_count: i64,
    pub(crate) items: Vec<QuestionDraft>,
}

impl ExamBlueprint {
    /// Top the item list up from the curated pool so the blueprint always
    /// carries exactly `question_count` questions.
    pub(crate) fn ensure_items(&mut self) {
        let target = self.question_count.max(0) as usize;
        if self.items.len() >= target {
            self.items.truncate(target);
            return;
        }
        let missing = target - self.items.len();
        let start = self.items.len();
        self.items.extend(fallback::questions_for_category(self.category, start, missing));
    }
}

fn schema_description(category: Category) -> &'static str {
    match category {
        Category::Vocabulary => {
            "Return JSON array of objects with keys word, correct_answer, wrong1, wrong2, wrong3."
        }
        Category::Grammar => {
            "Return JSON array of objects with keys sentence_with_placeholder \
             (use __ for blank), correct_answer, wrong1, wrong2, wrong3."
        }
        Category::Translation => {
            "Return JSON array of objects with keys prompt and reference_answer."
        }
    }
}

/// Ask the model for 1-3 fresh bank questions; fall back to the curated pool
/// when it is unavailable or returns nothing usable.
pub(crate) async fn generate_questions(
    model: &ModelClient,
    category: Category,
    guidance: Option<&str>,
) -> (Vec<QuestionDraft>, bool) {
    let instructions = format!(
        "You are helping teachers prepare English exams. Always return valid JSON \
         and no other text. {} Produce 1-3 fresh questions.",
        schema_description(category)
    );
    let user_prompt = format!(
        "Category: {}\nTeacher guidance: {}",
        category.as_str(),
        guidance.unwrap_or("Create standard practice.")
    );

    match model.complete_json(&instructions, &user_prompt, 0.4).await {
        Ok(value) => {
            let drafts = question_drafts_from_value(category, &value);
            if drafts.is_empty() {
                tracing::warn!(category = category.as_str(), "AI returned no usable questions");
                (fallback::questions_for_category(category, 0, 3), true)
            } else {
                (drafts, false)
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, category = category.as_str(), "AI question generation failed");
            (fallback::questions_for_category(category, 0, 3), true)
        }
    }
}

/// Exactly `count` questions for one exam, model first, curated pool as the
/// substitute and as top-up when the model returns too few.
pub(crate) async fn exam_items(
    model: &ModelClient,
    category: Category,
    count: usize,
    guidance: Option<&str>,
) -> (Vec<QuestionDraft>, bool) {
    let instructions = format!(
        "You are helping teachers prepare English exams. Always return valid JSON \
         and no other text. {} Produce exactly {count} questions.",
        schema_description(category)
    );
    let user_prompt = format!(
        "Category: {}\nTeacher guidance: {}",
        category.as_str(),
        guidance.unwrap_or("Create standard practice.")
    );

    match model.complete_json(&instructions, &user_prompt, 0.4).await {
        Ok(value) => {
            let mut drafts = question_drafts_from_value(category, &value);
            if drafts.is_empty() {
                tracing::warn!(category = category.as_str(), "AI returned no usable exam items");
                return (fallback::questions_for_category(category, 0, count), true);
            }
            if drafts.len() < count {
                let start = drafts.len();
                drafts.extend(fallback::questions_for_category(category, start, count - start));
            }
            drafts.truncate(count);
            (drafts, false)
        }
        Err(err) => {
            tracing::warn!(error = %err, category = category.as_str(), "AI exam item generation failed");
            (fallback::questions_for_category(category, 0, count), true)
        }
    }
}

/// Ask the model for a complete exam descriptor, with optional web research
/// rounds; fall back to a curated template when it is unavailable.
pub(crate) async fn generate_exam(
    model: &ModelClient,
    prompt: Option<&str>,
) -> (ExamBlueprint, bool) {
    let instructions = "Create a single exam descriptor as JSON with keys title, description, \
        category (vocabulary/grammar/translation), questions (int between 3 and 10) \
        and items (array of questions). Each item needs prompt, answer_type ('mcq' or 'text'), \
        correct_answer, wrong1, wrong2, wrong3, reference_answer. \
        Return JSON only.";
    let user_prompt = prompt.unwrap_or("Create a balanced assessment.");

    match web_search::request_ai_json_with_web_search(model, instructions, user_prompt, 2).await {
        Ok(value) => (blueprint_from_value(&value), false),
        Err(err) => {
            tracing::warn!(error = %err, "AI exam generation failed");
            (fallback::exam_blueprint(user_prompt), true)
        }
    }
}

fn truncated(value: &str, max: usize) -> String {
    value.trim().chars().take(max).collect()
}

fn string_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Normalize an untrusted model reply into bank-question drafts. Items that
/// miss required fields are dropped rather than failing the batch.
pub(crate) fn question_drafts_from_value(category: Category, value: &Value) -> Vec<QuestionDraft> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| {
            if !item.is_object() {
                return None;
            }
            match category {
                Category::Vocabulary => {
                    let word = string_field(item, "word")?;
                    Some(QuestionDraft {
                        prompt: truncated(
                            &format!("Select the correct meaning for the word '{word}'."),
                            MAX_PROMPT_LEN,
                        ),
                        answer_type: AnswerType::Mcq,
                        correct_answer: Some(truncated(
                            &string_field(item, "correct_answer")?,
                            MAX_ANSWER_LEN,
                        )),
                        wrong1: string_field(item, "wrong1")
                            .map(|text| truncated(&text, MAX_ANSWER_LEN)),
                        wrong2: string_field(item, "wrong2")
                            .map(|text| truncated(&text, MAX_ANSWER_LEN)),
                        wrong3: string_field(item, "wrong3")
                            .map(|text| truncated(&text, MAX_ANSWER_LEN)),
                        reference_answer: None,
                    })
                }
                Category::Grammar => {
                    let sentence = string_field(item, "sentence_with_placeholder")?;
                    Some(QuestionDraft {
                        prompt: truncated(&sentence.replace("__", "____"), MAX_PROMPT_LEN),
                        answer_type: AnswerType::Mcq,
                        correct_answer: Some(truncated(
                            &string_field(item, "correct_answer")?,
                            MAX_ANSWER_LEN,
                        )),
                        wrong1: string_field(item, "wrong1")
                            .map(|text| truncated(&text, MAX_ANSWER_LEN)),
                        wrong2: string_field(item, "wrong2")
                            .map(|text| truncated(&text, MAX_ANSWER_LEN)),
                        wrong3: string_field(item, "wrong3")
                            .map(|text| truncated(&text, MAX_ANSWER_LEN)),
                        reference_answer: None,
                    })
                }
                Category::Translation => {
                    let prompt = string_field(item, "prompt")?;
                    Some(QuestionDraft {
                        prompt: truncated(&prompt, MAX_PROMPT_LEN),
                        answer_type: AnswerType::Text,
                        correct_answer: None,
                        wrong1: None,
                        wrong2: None,
                        wrong3: None,
                        reference_answer: Some(truncated(
                            &string_field(item, "reference_answer")?,
                            MAX_REFERENCE_LEN,
                        )),
                    })
                }
            }
        })
        .collect()
}

/// Normalize an untrusted model reply into an exam blueprint, clamping the
/// question count and defaulting unknown categories.
pub(crate) fn blueprint_from_value(value: &Value) -> ExamBlueprint {
    let value = match value {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };

    let category = value
        .get("category")
        .and_then(Value::as_str)
        .and_then(Category::parse)
        .unwrap_or(Category::Vocabulary);

    let question_count = value
        .get("questions")
        .and_then(|raw| match raw {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(5)
        .clamp(MIN_QUESTIONS, MAX_QUESTIONS);

    let title = value
        .get("title")
        .and_then(Value::as_str)
        .map(|text| truncated(text, MAX_TITLE_LEN))
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "AI Exam Draft".to_string());

    let description = value
        .get("description")
        .and_then(Value::as_str)
        .map(|text| truncated(text, MAX_DESCRIPTION_LEN))
        .unwrap_or_default();

    let items = value
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| exam_item_from_value(category, item))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    ExamBlueprint { title, description, category, question_count, items }
}

fn exam_item_from_value(category: Category, item: &Value) -> Option<QuestionDraft> {
    let prompt = string_field(item, "prompt")?;

    let answer_type = item
        .get("answer_type")
        .and_then(Value::as_str)
        .map(|raw| raw.trim().to_ascii_lowercase())
        .and_then(|raw| match raw.as_str() {
            "mcq" => Some(AnswerType::Mcq),
            "text" => Some(AnswerType::Text),
            _ => None,
        })
        .unwrap_or_else(|| category.answer_type());

    let correct_answer =
        string_field(item, "correct_answer").map(|text| truncated(&text, MAX_ANSWER_LEN));
    let reference_answer = string_field(item, "reference_answer")
        .or_else(|| string_field(item, "correct_answer"))
        .map(|text| truncated(&text, MAX_REFERENCE_LEN));

    Some(QuestionDraft {
        prompt: truncated(&prompt, MAX_PROMPT_LEN),
        answer_type,
        correct_answer,
        wrong1: string_field(item, "wrong1").map(|text| truncated(&text, MAX_ANSWER_LEN)),
        wrong2: string_field(item, "wrong2").map(|text| truncated(&text, MAX_ANSWER_LEN)),
        wrong3: string_field(item, "wrong3").map(|text| truncated(&text, MAX_ANSWER_LEN)),
        reference_answer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vocabulary_items_are_rendered_into_prompts() {
        let value = json!([{
            "word": "keen",
            "correct_answer": "Eager and enthusiastic",
            "wrong1": "Tired",
            "wrong2": "Angry",
            "wrong3": "Lost"
        }]);
        let drafts = question_drafts_from_value(Category::Vocabulary, &value);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].prompt, "Select the correct meaning for the word 'keen'.");
        assert_eq!(drafts[0].answer_type, AnswerType::Mcq);
    }

    #[test]
    fn grammar_blanks_are_widened() {
        let value = json!({
            "sentence_with_placeholder": "She __ to school.",
            "correct_answer": "walks",
            "wrong1": "walk",
            "wrong2": "walking",
            "wrong3": "walked"
        });
        let drafts = question_drafts_from_value(Category::Grammar, &value);
        assert_eq!(drafts[0].prompt, "She ____ to school.");
    }

    #[test]
    fn invalid_items_are_dropped() {
        let value = json!([
            {"word": "", "correct_answer": "x"},
            {"unexpected": true},
            "just a string"
        ]);
        assert!(question_drafts_from_value(Category::Vocabulary, &value).is_empty());
    }

    #[test]
    fn blueprint_clamps_question_count_and_defaults_category() {
        let value = json!({
            "title": "Monster Exam",
            "category": "astrophysics",
            "questions": 42,
            "items": []
        });
        let blueprint = blueprint_from_value(&value);
        assert_eq!(blueprint.category, Category::Vocabulary);
        assert_eq!(blueprint.question_count, 10);
        assert_eq!(blueprint.title, "Monster Exam");
    }

    #[test]
    fn blueprint_accepts_stringly_counts_and_wrapping_arrays() {
        let value = json!([{
            "title": "Wrapped",
            "category": "grammar",
            "questions": "4",
            "items": [{"prompt": "Pick the tense.", "correct_answer": "past"}]
        }]);
        let blueprint = blueprint_from_value(&value);
        assert_eq!(blueprint.question_count, 4);
        assert_eq!(blueprint.category, Category::Grammar);
        assert_eq!(blueprint.items.len(), 1);
    }

    #[test]
    fn translation_items_default_to_text_answers() {
        let value = json!({
            "title": "T",
            "category": "translation",
            "questions": 3,
            "items": [{"prompt": "Translate: Hallo.", "correct_answer": "Hello."}]
        });
        let blueprint = blueprint_from_value(&value);
        assert_eq!(blueprint.items[0].answer_type, AnswerType::Text);
        assert_eq!(blueprint.items[0].reference_answer.as_deref(), Some("Hello."));
    }

    #[test]
    fn ensure_items_tops_up_from_the_curated_pool() {
        let mut blueprint = ExamBlueprint {
            title: "Short".to_string(),
            description: String::new(),
            category: Category::Grammar,
            question_count: 5,
            items: Vec::new(),
        };
        blueprint.ensure_items();
        assert_eq!(blueprint.items.len(), 5);

        blueprint.question_count = 3;
        blueprint.ensure_items();
        assert_eq!(blueprint.items.len(), 3);
    }
}
