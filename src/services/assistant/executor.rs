use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::db::types::{Category, UserRole};
use crate::repositories;
use crate::schemas::assistant::{ActionResult, ActionStatus};
use crate::services::assistant::intent::{Intent, NavigationTarget};
use crate::services::generation;

const MIN_QUESTIONS: i64 = 3;
const MAX_QUESTIONS: i64 = 10;
const DEFAULT_QUESTIONS: i64 = 5;
const TEMP_PASSWORD_LEN: usize = 12;

/// Static permission table. Classification hints are never trusted; every
/// execution re-checks the actor's role here.
pub(crate) fn permits(role: UserRole, intent: &Intent) -> bool {
    match intent {
        Intent::Navigate { .. } | Intent::Chat { .. } => true,
        Intent::CreateQuestion { .. } | Intent::CreateExam { .. } | Intent::CreateGroup { .. } => {
            role.is_staff()
        }
        Intent::CreateUser { .. } => role == UserRole::Admin,
    }
}

/// Execute one recognized intent for `actor`. Permission and validation
/// failures come back as `forbidden`/`error` results with no side effects;
/// an `Err` means the persistence layer itself failed.
pub(crate) async fn execute(
    state: &AppState,
    intent: &Intent,
    actor: &User,
) -> Result<ActionResult, sqlx::Error> {
    let kind = intent.kind();

    if !permits(actor.role, intent) {
        tracing::info!(
            user_id = %actor.id,
            role = actor.role.as_str(),
            action = kind,
            "Assistant action forbidden"
        );
        return Ok(ActionResult::forbidden(
            kind,
            format!("Your role ({}) is not allowed to do that.", actor.role.as_str()),
        ));
    }

    let result = match intent {
        Intent::Chat { .. } => {
            return Ok(ActionResult::error(kind, "Chat is not an executable action."))
        }
        Intent::Navigate { target } => navigate(actor, *target),
        Intent::CreateQuestion { category, guidance } => {
            create_question(state, actor, *category, guidance.as_deref()).await?
        }
        Intent::CreateExam { title, category, questions, guidance } => {
            create_exam(state, actor, title.as_deref(), *category, *questions, guidance.as_deref())
                .await?
        }
        Intent::CreateGroup { name, category, description } => {
            create_group(state, actor, name.as_deref(), *category, description.as_deref()).await?
        }
        Intent::CreateUser { username, email, role } => {
            create_user(state, actor, username.as_deref(), email.as_deref(), *role).await?
        }
    };

    Ok(result)
}

fn navigate(actor: &User, target: NavigationTarget) -> ActionResult {
    if !target.visible_to(actor.role) {
        return ActionResult::forbidden("navigate", "You do not have access to that page.");
    }

    let mut result = ActionResult::new("navigate", ActionStatus::Success);
    result.target = Some(target.path().to_string());
    result.message = Some(format!("Opening {}.", target.label()));
    result
}

async fn create_question(
    state: &AppState,
    actor: &User,
    category: Option<Category>,
    guidance: Option<&str>,
) -> Result<ActionResult, sqlx::Error> {
    let Some(category) = category else {
        return Ok(ActionResult::error(
            "create_question",
            "Please name a category: vocabulary, grammar, or translation.",
        ));
    };

    let (drafts, used_fallback) =
        generation::generate_questions(state.model(), category, guidance).await;
    let now = primitive_now_utc();

    let mut tx = state.db().begin().await?;
    let mut first_id = None;
    for draft in &drafts {
        let id = Uuid::new_v4().to_string();
        repositories::questions::create(
            &mut *tx,
            repositories::questions::CreateQuestion {
                id: &id,
                category,
                prompt: &draft.prompt,
                answer_type: draft.answer_type,
                correct_answer: draft.correct_answer.as_deref(),
                wrong1: draft.wrong1.as_deref(),
                wrong2: draft.wrong2.as_deref(),
                wrong3: draft.wrong3.as_deref(),
                reference_answer: draft.reference_answer.as_deref(),
                created_by: Some(&actor.id),
                created_at: now,
            },
        )
        .await?;
        first_id.get_or_insert(id);
    }
    tx.commit().await?;

    tracing::info!(
        user_id = %actor.id,
        category = category.as_str(),
        count = drafts.len(),
        fallback = used_fallback,
        action = "assistant_create_question",
        "Assistant added bank questions"
    );

    let mut result = ActionResult::new("create_question", ActionStatus::Success);
    result.id = first_id;
    result.category = Some(category);
    result.questions = Some(drafts.len() as i64);
    result.message = Some(if used_fallback {
        format!(
            "AI temporarily offline. Added {} sample {} questions instead.",
            drafts.len(),
            category.as_str()
        )
    } else {
        format!("Added {} fresh {} questions to the bank.", drafts.len(), category.as_str())
    });
    Ok(result)
}

async fn create_exam(
    state: &AppState,
    actor: &User,
    title: Option<&str>,
    category: Option<Category>,
    questions: Option<i64>,
    guidance: Option<&str>,
) -> Result<ActionResult, sqlx::Error> {
    let Some(title) = title.map(str::trim).filter(|title| !title.is_empty()) else {
        return Ok(ActionResult::error("create_exam", "Please provide a title for the exam."));
    };
    let Some(category) = category else {
        return Ok(ActionResult::error(
            "create_exam",
            "Please name a category: vocabulary, grammar, or translation.",
        ));
    };
    let question_count = questions.unwrap_or(DEFAULT_QUESTIONS);
    if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&question_count) {
        return Ok(ActionResult::error(
            "create_exam",
            format!("Question count must be between {MIN_QUESTIONS} and {MAX_QUESTIONS}."),
        ));
    }

    let title: String = title.chars().take(80).collect();
    let (items, used_fallback) = generation::exam_items(
        state.model(),
        category,
        question_count as usize,
        guidance,
    )
    .await;

    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();
    let ai_source = if used_fallback { "fallback" } else { "assistant" };

    let mut tx = state.db().begin().await?;
    repositories::exams::create(
        &mut *tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: &title,
            description: guidance,
            category,
            question_count: question_count as i32,
            is_active: true,
            study_enabled: true,
            test_enabled: true,
            ai_prompt: guidance,
            created_by: Some(&actor.id),
            created_at: now,
            updated_at: now,
        },
    )
    .await?;

    for (index, draft) in items.iter().enumerate() {
        repositories::exams::create_question(
            &mut *tx,
            repositories::exams::CreateExamQuestion {
                id: &Uuid::new_v4().to_string(),
                exam_id: &exam_id,
                prompt: &draft.prompt,
                answer_type: draft.answer_type,
                correct_answer: draft.correct_answer.as_deref(),
                wrong1: draft.wrong1.as_deref(),
                wrong2: draft.wrong2.as_deref(),
                wrong3: draft.wrong3.as_deref(),
                reference_answer: draft.reference_answer.as_deref(),
                position: (index + 1) as i32,
                ai_source: Some(ai_source),
            },
        )
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        user_id = %actor.id,
        exam_id = %exam_id,
        category = category.as_str(),
        questions = items.len(),
        fallback = used_fallback,
        action = "assistant_create_exam",
        "Assistant created exam"
    );

    let mut result = ActionResult::new("create_exam", ActionStatus::Success);
    result.id = Some(exam_id);
    result.title = Some(title.clone());
    result.category = Some(category);
    result.questions = Some(items.len() as i64);
    result.message = Some(if used_fallback {
        format!("AI unavailable. Created '{title}' from the built-in {} bank.", category.as_str())
    } else {
        format!("Created exam '{title}' with {} {} questions.", items.len(), category.as_str())
    });
    Ok(result)
}

async fn create_group(
    state: &AppState,
    actor: &User,
    name: Option<&str>,
    category: Option<Category>,
    description: Option<&str>,
) -> Result<ActionResult, sqlx::Error> {
    let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
        return Ok(ActionResult::error("create_group", "Please provide a name for the pack."));
    };
    let Some(category) = category else {
        return Ok(ActionResult::error(
            "create_group",
            "Please name a category: vocabulary, grammar, or translation.",
        ));
    };

    let group = repositories::groups::create(
        state.db(),
        repositories::groups::CreateGroup {
            id: &Uuid::new_v4().to_string(),
            name,
            category,
            description,
            ai_prompt: None,
            created_by: Some(&actor.id),
            created_at: primitive_now_utc(),
        },
    )
    .await?;

    tracing::info!(
        user_id = %actor.id,
        group_id = %group.id,
        action = "assistant_create_group",
        "Assistant created study pack"
    );

    let mut result = ActionResult::new("create_group", ActionStatus::Success);
    result.id = Some(group.id);
    result.title = Some(group.name);
    result.category = Some(category);
    result.message = Some(format!("Created study pack '{name}'."));
    Ok(result)
}

async fn create_user(
    state: &AppState,
    actor: &User,
    username: Option<&str>,
    email: Option<&str>,
    role: Option<UserRole>,
) -> Result<ActionResult, sqlx::Error> {
    let Some(username) = username.map(str::trim).filter(|name| !name.is_empty()) else {
        return Ok(ActionResult::error("create_user", "Please provide a username."));
    };
    let Some(email) = email.map(str::trim).filter(|email| email.contains('@')) else {
        return Ok(ActionResult::error("create_user", "Please provide a valid email address."));
    };
    let role = role.unwrap_or(UserRole::Student);

    let existing =
        repositories::users::exists_by_username_or_email(state.db(), username, email).await?;
    if existing.is_some() {
        return Ok(ActionResult::error("create_user", "Username or email already exists."));
    }

    let temp_password: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_PASSWORD_LEN)
        .map(char::from)
        .collect();
    let hashed_password = match security::hash_password(&temp_password) {
        Ok(hash) => hash,
        Err(err) => {
            tracing::error!(error = %err, "Failed to hash temporary password");
            return Ok(ActionResult::error("create_user", "Could not create the account."));
        }
    };

    let now = primitive_now_utc();
    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username,
            email,
            hashed_password,
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .await?;

    tracing::info!(
        admin_id = %actor.id,
        user_id = %user.id,
        role = role.as_str(),
        action = "assistant_create_user",
        "Assistant created user"
    );

    let mut result = ActionResult::new("create_user", ActionStatus::Success);
    result.id = Some(user.id);
    result.username = Some(username.to_string());
    result.message = Some(format!(
        "Created {} account for {username}. Temporary password: {temp_password}",
        role.as_str()
    ));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: &str) -> Intent {
        match kind {
            "navigate" => Intent::Navigate { target: NavigationTarget::Exams },
            "create_question" => Intent::CreateQuestion { category: None, guidance: None },
            "create_exam" => Intent::CreateExam {
                title: None,
                category: None,
                questions: None,
                guidance: None,
            },
            "create_group" => Intent::CreateGroup { name: None, category: None, description: None },
            "create_user" => Intent::CreateUser { username: None, email: None, role: None },
            _ => Intent::Chat { question: String::new() },
        }
    }

    #[test]
    fn students_may_only_navigate_and_chat() {
        assert!(permits(UserRole::Student, &sample("navigate")));
        assert!(permits(UserRole::Student, &sample("chat")));
        for kind in ["create_question", "create_exam", "create_group", "create_user"] {
            assert!(!permits(UserRole::Student, &sample(kind)), "student must not {kind}");
        }
    }

    #[test]
    fn teachers_create_content_but_not_users() {
        for kind in ["navigate", "chat", "create_question", "create_exam", "create_group"] {
            assert!(permits(UserRole::Teacher, &sample(kind)), "teacher should {kind}");
        }
        assert!(!permits(UserRole::Teacher, &sample("create_user")));
    }

    #[test]
    fn admins_may_do_everything() {
        for kind in
            ["navigate", "chat", "create_question", "create_exam", "create_group", "create_user"]
        {
            assert!(permits(UserRole::Admin, &sample(kind)), "admin should {kind}");
        }
    }
}
