use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use axum::Json;
use tokio::sync::mpsc;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::schemas::assistant::{AssistantRequest, SearchRequest, SearchResponse};
use crate::services::assistant::turn;
use crate::services::web_search::{self, SearchError};

/// Max assistant turns per user per window.
const ASSISTANT_RATE_LIMIT: u64 = 20;
const ASSISTANT_RATE_WINDOW_SECONDS: u64 = 60;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// One assistant turn, streamed back as newline-delimited JSON events. The
/// turn runs in its own task; dropping the response body is the cancellation
/// signal.
pub(crate) async fn assistant(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<AssistantRequest>,
) -> Result<Response, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let rate_key = format!("rl:assistant:{}", user.id);
    let allowed = state
        .redis()
        .rate_limit(&rate_key, ASSISTANT_RATE_LIMIT, ASSISTANT_RATE_WINDOW_SECONDS)
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many assistant requests, try again later"));
    }

    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(turn::run_turn(state, user, payload.message, tx));

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(mut line) => {
                    line.push('\n');
                    yield Ok::<String, Infallible>(line);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to serialize assistant event");
                }
            }
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(e, "Failed to build assistant response"))
}

pub(crate) async fn search(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = web_search::search_internet(
        state.http(),
        &payload.query,
        web_search::DEFAULT_MAX_RESULTS,
    )
    .await
    .map_err(|err| match err {
        SearchError::EmptyQuery => ApiError::BadRequest("A search query is required".to_string()),
        SearchError::Request(reason) => ApiError::internal(reason, "Web search failed"),
    })?;

    Ok(Json(SearchResponse { query: payload.query.trim().to_string(), results }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::db::types::UserRole;
    use crate::repositories;
    use crate::test_support;

    #[tokio::test]
    async fn admin_exam_request_creates_exam_atomically_via_fallback() {
        let ctx = test_support::setup_test_context().await;

        let admin = test_support::insert_user(
            ctx.state.db(),
            "assistant-admin",
            "assistant-admin@example.com",
            UserRole::Admin,
            "assist-pass",
        )
        .await;
        let token = test_support::bearer_token(&admin.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/assistant",
                Some(&token),
                Some(json!({"message": "create a grammar exam called Midterm with 5 questions"})),
            ))
            .await
            .expect("assistant turn");
        assert_eq!(response.status(), StatusCode::OK);

        let events = test_support::read_ndjson(response).await;
        let terminal = events.last().expect("terminal event");
        assert_eq!(terminal["type"], "done");

        let actions = terminal["actions"].as_array().expect("actions");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["type"], "create_exam");
        assert_eq!(actions[0]["status"], "success");
        assert_eq!(actions[0]["title"], "Midterm");
        assert_eq!(actions[0]["category"], "grammar");
        assert_eq!(actions[0]["questions"], 5);

        // Exactly one terminal event, nothing after it.
        let terminal_count =
            events.iter().filter(|event| event["type"] == "done" || event["type"] == "error").count();
        assert_eq!(terminal_count, 1);

        let exam = repositories::exams::find_by_title(ctx.state.db(), "Midterm")
            .await
            .expect("query exam")
            .expect("exam row");
        let questions = repositories::exams::count_questions(ctx.state.db(), &exam.id)
            .await
            .expect("count questions");
        assert_eq!(questions, 5);
    }

    #[tokio::test]
    async fn student_create_request_leaves_the_bank_untouched() {
        let ctx = test_support::setup_test_context().await;

        let student = test_support::insert_user(
            ctx.state.db(),
            "assistant-student",
            "assistant-student@example.com",
            UserRole::Student,
            "assist-pass",
        )
        .await;
        let token = test_support::bearer_token(&student.id, ctx.state.settings());

        let before = repositories::questions::count_all(ctx.state.db()).await.expect("count");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/assistant",
                Some(&token),
                Some(json!({"message": "create a question"})),
            ))
            .await
            .expect("assistant turn");
        assert_eq!(response.status(), StatusCode::OK);

        let events = test_support::read_ndjson(response).await;
        let terminal = events.last().expect("terminal event");
        assert_eq!(terminal["type"], "done");
        assert_eq!(terminal["actions"][0]["status"], "forbidden");

        let after = repositories::questions::count_all(ctx.state.db()).await.expect("count");
        assert_eq!(before, after, "forbidden action must not write");
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let ctx = test_support::setup_test_context().await;

        let user = test_support::insert_user(
            ctx.state.db(),
            "empty-msg",
            "empty-msg@example.com",
            UserRole::Student,
            "assist-pass",
        )
        .await;
        let token = test_support::bearer_token(&user.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/assistant",
                Some(&token),
                Some(json!({"message": "   "})),
            ))
            .await
            .expect("assistant turn");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
