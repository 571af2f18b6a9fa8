use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::db::types::{Category, UserRole};
use crate::services::model_client::ModelClient;

/// Where the assistant can send the user. Targets map onto the frontend
/// routes; visibility mirrors the route guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NavigationTarget {
    Dashboard,
    Exams,
    QuestionBank,
    StudyPacks,
    Results,
    Analyze,
    Profile,
    AdminUsers,
}

impl NavigationTarget {
    pub(crate) fn slug(self) -> &'static str {
        match self {
            NavigationTarget::Dashboard => "dashboard",
            NavigationTarget::Exams => "exams",
            NavigationTarget::QuestionBank => "question_bank",
            NavigationTarget::StudyPacks => "study_packs",
            NavigationTarget::Results => "results",
            NavigationTarget::Analyze => "analyze",
            NavigationTarget::Profile => "profile",
            NavigationTarget::AdminUsers => "users",
        }
    }

    pub(crate) fn path(self) -> &'static str {
        match self {
            NavigationTarget::Dashboard => "/dashboard",
            NavigationTarget::Exams => "/exams",
            NavigationTarget::QuestionBank => "/admin/questions",
            NavigationTarget::StudyPacks => "/study-packs",
            NavigationTarget::Results => "/results",
            NavigationTarget::Analyze => "/analyze",
            NavigationTarget::Profile => "/profile",
            NavigationTarget::AdminUsers => "/admin/users",
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            NavigationTarget::Dashboard => "the dashboard",
            NavigationTarget::Exams => "the exams page",
            NavigationTarget::QuestionBank => "the question bank",
            NavigationTarget::StudyPacks => "the study packs",
            NavigationTarget::Results => "your results",
            NavigationTarget::Analyze => "the document analyzer",
            NavigationTarget::Profile => "your profile",
            NavigationTarget::AdminUsers => "the user management page",
        }
    }

    pub(crate) fn visible_to(self, role: UserRole) -> bool {
        match self {
            NavigationTarget::QuestionBank => role.is_staff(),
            NavigationTarget::AdminUsers => role == UserRole::Admin,
            _ => true,
        }
    }

    pub(crate) fn from_slug(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "dashboard" | "home" => Some(NavigationTarget::Dashboard),
            "exams" | "exam" => Some(NavigationTarget::Exams),
            "question_bank" | "questions" | "bank" => Some(NavigationTarget::QuestionBank),
            "study_packs" | "groups" => Some(NavigationTarget::StudyPacks),
            "results" => Some(NavigationTarget::Results),
            "analyze" | "analyzer" => Some(NavigationTarget::Analyze),
            "profile" => Some(NavigationTarget::Profile),
            "users" | "admin_users" => Some(NavigationTarget::AdminUsers),
            _ => None,
        }
    }

    /// Keyword lookup for the heuristic matcher; multi-word phrases are
    /// checked before their shorter substrings.
    fn from_message(lowered: &str) -> Option<Self> {
        const KEYWORDS: &[(&str, NavigationTarget)] = &[
            ("question bank", NavigationTarget::QuestionBank),
            ("study pack", NavigationTarget::StudyPacks),
            ("dashboard", NavigationTarget::Dashboard),
            ("exam", NavigationTarget::Exams),
            ("result", NavigationTarget::Results),
            ("score", NavigationTarget::Results),
            ("analy", NavigationTarget::Analyze),
            ("profile", NavigationTarget::Profile),
            ("user", NavigationTarget::AdminUsers),
            ("bank", NavigationTarget::QuestionBank),
            ("home", NavigationTarget::Dashboard),
        ];
        KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, target)| *target)
    }
}

/// Closed set of recognized intents. Parameters stay optional here; the
/// executor owns validation and authorization.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Intent {
    Navigate {
        target: NavigationTarget,
    },
    CreateQuestion {
        category: Option<Category>,
        guidance: Option<String>,
    },
    CreateExam {
        title: Option<String>,
        category: Option<Category>,
        questions: Option<i64>,
        guidance: Option<String>,
    },
    CreateGroup {
        name: Option<String>,
        category: Option<Category>,
        description: Option<String>,
    },
    CreateUser {
        username: Option<String>,
        email: Option<String>,
        role: Option<UserRole>,
    },
    Chat {
        question: String,
    },
}

impl Intent {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Intent::Navigate { .. } => "navigate",
            Intent::CreateQuestion { .. } => "create_question",
            Intent::CreateExam { .. } => "create_exam",
            Intent::CreateGroup { .. } => "create_group",
            Intent::CreateUser { .. } => "create_user",
            Intent::Chat { .. } => "chat",
        }
    }

    pub(crate) fn is_chat(&self) -> bool {
        matches!(self, Intent::Chat { .. })
    }
}

/// Router output. The fallback matcher yields exactly one intent; the model
/// may return an answer plus several actions.
#[derive(Debug, Clone)]
pub(crate) struct Classification {
    pub(crate) answer: Option<String>,
    pub(crate) intents: Vec<Intent>,
}

impl Classification {
    fn chat(message: &str) -> Self {
        Self { answer: None, intents: vec![Intent::Chat { question: message.to_string() }] }
    }
}

pub(crate) async fn classify(
    model: &ModelClient,
    role: UserRole,
    message: &str,
) -> Classification {
    match model.complete_json(&router_instructions(role), message, 0.3).await {
        Ok(value) => parse_model_reply(&value, message, role),
        Err(err) => {
            tracing::debug!(error = %err, "Intent model unavailable, using keyword matcher");
            fallback_classify(message, role)
        }
    }
}

fn permitted_kinds(role: UserRole) -> &'static str {
    match role {
        UserRole::Student => "navigate",
        UserRole::Teacher => "navigate, create_question, create_exam, create_group",
        UserRole::Admin => "navigate, create_question, create_exam, create_group, create_user",
    }
}

fn router_instructions(role: UserRole) -> String {
    format!(
        "You are the assistant of an English practice platform. Decide what the user \
         wants and reply with strict JSON only: {{\"answer\": \"...\", \"actions\": [...]}}.\n\
         Each action is one of:\n\
         {{\"type\": \"navigate\", \"target\": \"dashboard|exams|question_bank|study_packs|results|analyze|profile|users\"}}\n\
         {{\"type\": \"create_question\", \"category\": \"vocabulary|grammar|translation\", \"guidance\": \"...\"}}\n\
         {{\"type\": \"create_exam\", \"title\": \"...\", \"category\": \"vocabulary|grammar|translation\", \"questions\": 3}}\n\
         {{\"type\": \"create_group\", \"name\": \"...\", \"category\": \"vocabulary|grammar|translation\", \"description\": \"...\"}}\n\
         {{\"type\": \"create_user\", \"username\": \"...\", \"email\": \"...\", \"role\": \"student|teacher|admin\"}}\n\
         Use an empty actions array for plain conversation.\n\
         The caller is a {role}; only suggest these action types: {permitted}.",
        role = role.as_str(),
        permitted = permitted_kinds(role),
    )
}

/// Promote an untrusted model reply. Anything that does not match the schema
/// degrades to chat; individually malformed actions are dropped.
fn parse_model_reply(value: &Value, message: &str, role: UserRole) -> Classification {
    if !value.is_object() {
        return Classification::chat(message);
    }

    let answer = value
        .get("answer")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    let intents: Vec<Intent> = value
        .get("actions")
        .and_then(Value::as_array)
        .map(|actions| {
            actions
                .iter()
                .filter_map(|action| intent_from_action(action, message, role))
                .collect()
        })
        .unwrap_or_default();

    if intents.is_empty() && answer.is_none() {
        return Classification::chat(message);
    }

    Classification { answer, intents }
}

fn intent_from_action(action: &Value, message: &str, role: UserRole) -> Option<Intent> {
    let kind = action.get("type").and_then(Value::as_str)?;
    let text = |key: &str| {
        action
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let category = |key: &str| action.get(key).and_then(Value::as_str).and_then(Category::parse);

    match kind {
        "navigate" => {
            let target = NavigationTarget::from_slug(action.get("target")?.as_str()?)?;
            // Recognition-level gating; the executor authorizes again.
            if !target.visible_to(role) {
                return None;
            }
            Some(Intent::Navigate { target })
        }
        "create_question" => Some(Intent::CreateQuestion {
            category: category("category"),
            guidance: text("guidance").or_else(|| Some(message.to_string())),
        }),
        "create_exam" => Some(Intent::CreateExam {
            title: text("title"),
            category: category("category"),
            questions: action.get("questions").and_then(|raw| match raw {
                Value::Number(number) => number.as_i64(),
                Value::String(text) => text.trim().parse().ok(),
                _ => None,
            }),
            guidance: text("guidance").or_else(|| Some(message.to_string())),
        }),
        "create_group" => Some(Intent::CreateGroup {
            name: text("name"),
            category: category("category"),
            description: text("description"),
        }),
        "create_user" => Some(Intent::CreateUser {
            username: text("username"),
            email: text("email"),
            role: action.get("role").and_then(Value::as_str).and_then(UserRole::parse),
        }),
        "chat" => Some(Intent::Chat { question: message.to_string() }),
        _ => None,
    }
}

const NAV_TRIGGERS: &[&str] = &["go to", "take me to", "take me", "show me", "open", "navigate to"];
const CREATE_VERBS: &[&str] = &["create", "add", "make", "generate", "build", "new"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateTarget {
    Exam,
    Question,
    Group,
    User,
}

const CREATE_OBJECTS: &[(&str, CreateTarget)] = &[
    ("study pack", CreateTarget::Group),
    ("question", CreateTarget::Question),
    ("exam", CreateTarget::Exam),
    ("test", CreateTarget::Exam),
    ("quiz", CreateTarget::Exam),
    ("group", CreateTarget::Group),
    ("pack", CreateTarget::Group),
    ("user", CreateTarget::User),
    ("account", CreateTarget::User),
    ("student", CreateTarget::User),
];

/// Keyword matcher used when the model is unavailable. Whichever trigger
/// phrase appears first in the message wins, so "go to the new exam page"
/// navigates while "create an open exam" creates. Among creation objects
/// the one closest to the verb wins, so "create a grammar exam ... with
/// 5 questions" is an exam, not a question.
pub(crate) fn fallback_classify(message: &str, role: UserRole) -> Classification {
    let lowered = message.to_lowercase();

    let nav_at = NAV_TRIGGERS
        .iter()
        .filter_map(|trigger| {
            if trigger.contains(' ') {
                lowered.find(trigger)
            } else {
                find_word(&lowered, trigger)
            }
        })
        .min();
    let verb_at = CREATE_VERBS.iter().filter_map(|verb| find_word(&lowered, verb)).min();

    let nav_wins = match (nav_at, verb_at) {
        (Some(nav), Some(verb)) => nav < verb,
        (Some(_), None) => true,
        _ => false,
    };

    if nav_wins {
        if let Some(target) = NavigationTarget::from_message(&lowered) {
            if target.visible_to(role) {
                return Classification {
                    answer: None,
                    intents: vec![Intent::Navigate { target }],
                };
            }
        }
        return Classification::chat(message);
    }

    let Some(verb_at) = verb_at else {
        return Classification::chat(message);
    };

    let target = CREATE_OBJECTS
        .iter()
        .filter_map(|(object, target)| {
            lowered[verb_at..].find(object).map(|offset| (offset, *object, *target))
        })
        .min_by_key(|(offset, object, _)| (*offset, std::cmp::Reverse(object.len())));

    let Some((_, _, target)) = target else {
        return Classification::chat(message);
    };

    let intent = match target {
        CreateTarget::Exam => Intent::CreateExam {
            title: extract_title(message),
            category: extract_category(&lowered),
            questions: extract_count(&lowered),
            guidance: Some(message.to_string()),
        },
        CreateTarget::Question => Intent::CreateQuestion {
            category: extract_category(&lowered),
            guidance: Some(message.to_string()),
        },
        CreateTarget::Group => Intent::CreateGroup {
            name: extract_title(message),
            category: extract_category(&lowered),
            description: None,
        },
        CreateTarget::User => Intent::CreateUser {
            username: extract_username(message),
            email: extract_email(message),
            role: extract_role(&lowered),
        },
    };

    Classification { answer: None, intents: vec![intent] }
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(word) {
        let at = from + offset;
        let before_ok = at == 0
            || !haystack[..at].chars().next_back().map(char::is_alphanumeric).unwrap_or(false);
        let after = at + word.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..].chars().next().map(char::is_alphanumeric).unwrap_or(false);
        if before_ok && after_ok {
            return Some(at);
        }
        from = after;
    }
    None
}

fn extract_category(lowered: &str) -> Option<Category> {
    if lowered.contains("vocab") {
        Some(Category::Vocabulary)
    } else if lowered.contains("grammar") {
        Some(Category::Grammar)
    } else if lowered.contains("translat") {
        Some(Category::Translation)
    } else {
        None
    }
}

fn extract_count(lowered: &str) -> Option<i64> {
    static COUNT: OnceLock<Regex> = OnceLock::new();
    let re = COUNT.get_or_init(|| Regex::new(r"\b(\d{1,3})\b").expect("count regex"));
    re.captures(lowered)?.get(1)?.as_str().parse().ok()
}

fn extract_title(message: &str) -> Option<String> {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    let re = TITLE.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(?:called|named|titled)\s+(?:"([^"]+)"|'([^']+)'|(.+?))(?:\s+with\s+.*|\s+containing\s+.*)?$"#,
        )
        .expect("title regex")
    });

    let captures = re.captures(message)?;
    let raw = captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))?
        .as_str()
        .trim()
        .trim_end_matches(['.', '!', '?', ','])
        .trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn extract_email(message: &str) -> Option<String> {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
    });
    re.find(message).map(|m| m.as_str().to_string())
}

fn extract_username(message: &str) -> Option<String> {
    if let Some(title) = extract_title(message) {
        let first_word = title.split_whitespace().next().unwrap_or_default();
        if !first_word.is_empty() && !first_word.contains('@') {
            return Some(first_word.to_string());
        }
    }

    static AFTER_OBJECT: OnceLock<Regex> = OnceLock::new();
    let re = AFTER_OBJECT.get_or_init(|| {
        Regex::new(r"(?i)\b(?:user|account|student)\s+(?:for\s+)?([A-Za-z0-9_.-]+)")
            .expect("username regex")
    });

    let candidate = re.captures(message)?.get(1)?.as_str();
    let skip = ["with", "for", "and", "named", "called", "the", "a", "an", "account"];
    if candidate.contains('@') || skip.contains(&candidate.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(candidate.to_string())
}

fn extract_role(lowered: &str) -> Option<UserRole> {
    if lowered.contains("teacher") {
        Some(UserRole::Teacher)
    } else if lowered.contains("admin") {
        Some(UserRole::Admin)
    } else if lowered.contains("student") {
        Some(UserRole::Student)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single_intent(classification: Classification) -> Intent {
        assert_eq!(classification.intents.len(), 1, "expected one intent");
        classification.intents.into_iter().next().unwrap()
    }

    #[test]
    fn unrecognized_messages_become_chat_for_every_role() {
        for role in [UserRole::Student, UserRole::Teacher, UserRole::Admin] {
            let intent = single_intent(fallback_classify("how do past participles work?", role));
            assert!(intent.is_chat(), "role {role:?} should fall through to chat");
        }
    }

    #[test]
    fn exam_creation_with_title_category_and_count() {
        let classification = fallback_classify(
            "create a grammar exam called Midterm with 5 questions",
            UserRole::Admin,
        );
        match single_intent(classification) {
            Intent::CreateExam { title, category, questions, .. } => {
                assert_eq!(title.as_deref(), Some("Midterm"));
                assert_eq!(category, Some(Category::Grammar));
                assert_eq!(questions, Some(5));
            }
            other => panic!("expected create_exam, got {other:?}"),
        }
    }

    #[test]
    fn nearest_object_to_the_verb_wins() {
        // "questions" appears later than "exam"; the exam is what is created.
        let intent = single_intent(fallback_classify(
            "make an exam containing 8 questions",
            UserRole::Teacher,
        ));
        assert_eq!(intent.kind(), "create_exam");

        let intent =
            single_intent(fallback_classify("add a question about verbs", UserRole::Teacher));
        assert_eq!(intent.kind(), "create_question");
    }

    #[test]
    fn first_trigger_in_the_message_wins() {
        let intent =
            single_intent(fallback_classify("go to the new exam page", UserRole::Student));
        assert_eq!(intent, Intent::Navigate { target: NavigationTarget::Exams });

        let intent = single_intent(fallback_classify(
            "create an open exam about travel",
            UserRole::Teacher,
        ));
        assert_eq!(intent.kind(), "create_exam");
    }

    #[test]
    fn quoted_titles_are_preserved() {
        let intent = single_intent(fallback_classify(
            "create an exam called \"Unit 4 Review\" with 6 questions",
            UserRole::Teacher,
        ));
        match intent {
            Intent::CreateExam { title, .. } => assert_eq!(title.as_deref(), Some("Unit 4 Review")),
            other => panic!("expected create_exam, got {other:?}"),
        }
    }

    #[test]
    fn navigation_trigger_reaches_the_question_bank_for_staff() {
        let intent =
            single_intent(fallback_classify("go to the question bank", UserRole::Teacher));
        assert_eq!(intent, Intent::Navigate { target: NavigationTarget::QuestionBank });
    }

    #[test]
    fn navigation_to_hidden_targets_degrades_to_chat_for_students() {
        let intent =
            single_intent(fallback_classify("show me the question bank", UserRole::Student));
        assert!(intent.is_chat());
    }

    #[test]
    fn student_create_requests_are_still_recognized() {
        // Authorization lives in the executor; the router only classifies.
        let intent = single_intent(fallback_classify("create a question", UserRole::Student));
        assert_eq!(intent.kind(), "create_question");
    }

    #[test]
    fn user_creation_extracts_identity_fields() {
        let classification = fallback_classify(
            "create user anna with email anna@example.com as a teacher",
            UserRole::Admin,
        );
        match single_intent(classification) {
            Intent::CreateUser { username, email, role } => {
                assert_eq!(username.as_deref(), Some("anna"));
                assert_eq!(email.as_deref(), Some("anna@example.com"));
                assert_eq!(role, Some(UserRole::Teacher));
            }
            other => panic!("expected create_user, got {other:?}"),
        }
    }

    #[test]
    fn model_reply_with_actions_is_promoted() {
        let value = json!({
            "answer": "Drafted a grammar exam.",
            "actions": [
                {"type": "create_exam", "title": "Assistant Exam", "category": "grammar", "questions": 4}
            ]
        });
        let classification = parse_model_reply(&value, "Create a grammar test", UserRole::Admin);
        assert_eq!(classification.answer.as_deref(), Some("Drafted a grammar exam."));
        match &classification.intents[0] {
            Intent::CreateExam { title, category, questions, .. } => {
                assert_eq!(title.as_deref(), Some("Assistant Exam"));
                assert_eq!(*category, Some(Category::Grammar));
                assert_eq!(*questions, Some(4));
            }
            other => panic!("expected create_exam, got {other:?}"),
        }
    }

    #[test]
    fn malformed_model_replies_degrade_to_chat() {
        let classification =
            parse_model_reply(&json!("just text"), "hello there", UserRole::Student);
        assert!(single_intent(classification).is_chat());

        let classification = parse_model_reply(
            &json!({"actions": [{"type": "launch_rockets"}]}),
            "hello there",
            UserRole::Student,
        );
        assert!(single_intent(classification).is_chat());
    }

    #[test]
    fn model_navigation_suggestions_are_role_gated() {
        let value = json!({"actions": [{"type": "navigate", "target": "users"}]});
        let classification = parse_model_reply(&value, "open user admin", UserRole::Student);
        assert!(single_intent(classification).is_chat());
    }
}
