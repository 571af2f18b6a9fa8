use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Admin => "admin",
        }
    }

    /// Teachers and admins share the content-management surface.
    pub(crate) fn is_staff(self) -> bool {
        matches!(self, UserRole::Teacher | UserRole::Admin)
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(UserRole::Student),
            "teacher" => Some(UserRole::Teacher),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "questioncategory", rename_all = "lowercase")]
pub(crate) enum Category {
    Vocabulary,
    Grammar,
    Translation,
}

impl Category {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Category::Vocabulary => "vocabulary",
            Category::Grammar => "grammar",
            Category::Translation => "translation",
        }
    }

    pub(crate) fn answer_type(self) -> AnswerType {
        match self {
            Category::Translation => AnswerType::Text,
            _ => AnswerType::Mcq,
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vocabulary" => Some(Category::Vocabulary),
            "grammar" => Some(Category::Grammar),
            "translation" => Some(Category::Translation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "answertype", rename_all = "lowercase")]
pub(crate) enum AnswerType {
    Mcq,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "attemptmode", rename_all = "lowercase")]
pub(crate) enum AttemptMode {
    Study,
    Test,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_answer_types() {
        assert_eq!(Category::Vocabulary.answer_type(), AnswerType::Mcq);
        assert_eq!(Category::Grammar.answer_type(), AnswerType::Mcq);
        assert_eq!(Category::Translation.answer_type(), AnswerType::Text);
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(UserRole::parse(" Teacher "), Some(UserRole::Teacher));
        assert_eq!(UserRole::parse("ADMIN"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse("principal"), None);
    }

    #[test]
    fn staff_covers_teacher_and_admin() {
        assert!(!UserRole::Student.is_staff());
        assert!(UserRole::Teacher.is_staff());
        assert!(UserRole::Admin.is_staff());
    }
}
