use serde::{Deserialize, Serialize};

use crate::db::types::Category;

#[derive(Debug, Deserialize)]
pub(crate) struct AssistantRequest {
    pub(crate) message: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub(crate) context: Option<serde_json::Value>,
}

/// One newline-delimited JSON event on the assistant stream. A turn emits
/// any number of `status`/`progress`/`chunk` events followed by exactly one
/// `done` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AssistantEvent {
    Status {
        message: String,
    },
    Progress {
        message: String,
    },
    Chunk {
        content: String,
    },
    Done {
        answer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        navigate_to: Option<String>,
        actions: Vec<ActionResult>,
    },
    Error {
        message: String,
    },
}

impl AssistantEvent {
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, AssistantEvent::Done { .. } | AssistantEvent::Error { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ActionStatus {
    Success,
    Forbidden,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct ActionResult {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) questions: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) target: Option<String>,
}

impl ActionResult {
    pub(crate) fn new(kind: &str, status: ActionStatus) -> Self {
        Self {
            kind: kind.to_string(),
            status,
            message: None,
            id: None,
            title: None,
            category: None,
            questions: None,
            username: None,
            target: None,
        }
    }

    pub(crate) fn forbidden(kind: &str, message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::new(kind, ActionStatus::Forbidden) }
    }

    pub(crate) fn error(kind: &str, message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::new(kind, ActionStatus::Error) }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchRequest {
    #[serde(default)]
    pub(crate) query: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchResponse {
    pub(crate) query: String,
    pub(crate) results: Vec<crate::services::web_search::SearchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_event_skips_absent_navigation_target() {
        let event = AssistantEvent::Done {
            answer: "All set.".to_string(),
            navigate_to: None,
            actions: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "done");
        assert!(json.get("navigate_to").is_none());
        assert_eq!(json["actions"], serde_json::json!([]));
    }

    #[test]
    fn action_result_uses_wire_field_names() {
        let mut action = ActionResult::new("create_exam", ActionStatus::Success);
        action.title = Some("Midterm".to_string());
        action.category = Some(Category::Grammar);

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "create_exam");
        assert_eq!(json["status"], "success");
        assert_eq!(json["title"], "Midterm");
        assert_eq!(json["category"], "grammar");
        assert!(json.get("username").is_none());
    }

    #[test]
    fn terminal_detection() {
        assert!(AssistantEvent::Error { message: "boom".into() }.is_terminal());
        assert!(!AssistantEvent::Chunk { content: "hi".into() }.is_terminal());
    }
}
