use futures::{pin_mut, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::repositories;
use crate::schemas::assistant::{ActionResult, ActionStatus, AssistantEvent};
use crate::services::assistant::{executor, intent};
use crate::services::fallback;
use crate::services::model_client::ChatMessage;

/// The caller went away before the terminal event; the turn is abandoned.
/// Actions already committed stay committed.
#[derive(Debug)]
pub(crate) struct TransportClosed;

#[derive(Debug)]
enum TurnError {
    Transport,
    Internal(sqlx::Error),
}

impl From<TransportClosed> for TurnError {
    fn from(_: TransportClosed) -> Self {
        TurnError::Transport
    }
}

struct EventSink {
    tx: mpsc::Sender<AssistantEvent>,
}

impl EventSink {
    async fn send(&self, event: AssistantEvent) -> Result<(), TransportClosed> {
        self.tx.send(event).await.map_err(|_| TransportClosed)
    }

    async fn status(&self, message: &str) -> Result<(), TransportClosed> {
        self.send(AssistantEvent::Status { message: message.to_string() }).await
    }

    async fn progress(&self, message: String) -> Result<(), TransportClosed> {
        self.send(AssistantEvent::Progress { message }).await
    }

    async fn chunk(&self, content: String) -> Result<(), TransportClosed> {
        self.send(AssistantEvent::Chunk { content }).await
    }
}

struct TurnOutcome {
    answer: String,
    navigate_to: Option<String>,
    actions: Vec<ActionResult>,
}

/// One assistant turn: classify, execute, answer, then exactly one terminal
/// event. Spawned per request; the mpsc sender is the event stream.
pub(crate) async fn run_turn(
    state: AppState,
    user: User,
    message: String,
    tx: mpsc::Sender<AssistantEvent>,
) {
    let sink = EventSink { tx };

    match drive(&state, &user, &message, &sink).await {
        Ok(outcome) => {
            let terminal = AssistantEvent::Done {
                answer: outcome.answer.clone(),
                navigate_to: outcome.navigate_to.clone(),
                actions: outcome.actions.clone(),
            };
            if sink.send(terminal).await.is_err() {
                metrics::counter!("assistant_turns_total", "outcome" => "abandoned").increment(1);
                tracing::debug!(user_id = %user.id, "Client disconnected before done event");
                return;
            }
            metrics::counter!("assistant_turns_total", "outcome" => "done").increment(1);
            record_transcript(&state, &user, &message, &outcome).await;
        }
        Err(TurnError::Transport) => {
            metrics::counter!("assistant_turns_total", "outcome" => "abandoned").increment(1);
            tracing::debug!(user_id = %user.id, "Client disconnected mid-turn");
        }
        Err(TurnError::Internal(err)) => {
            metrics::counter!("assistant_turns_total", "outcome" => "error").increment(1);
            tracing::error!(error = %err, user_id = %user.id, "Assistant turn failed");
            let _ = sink
                .send(AssistantEvent::Error {
                    message: "The assistant ran into an unexpected problem. Please try again."
                        .to_string(),
                })
                .await;
        }
    }
}

async fn drive(
    state: &AppState,
    user: &User,
    message: &str,
    sink: &EventSink,
) -> Result<TurnOutcome, TurnError> {
    sink.status("Reading your request").await?;

    let classification = intent::classify(state.model(), user.role, message).await;

    let mut actions: Vec<ActionResult> = Vec::new();
    let mut navigate_to = None;

    for intent in classification.intents.iter().filter(|intent| !intent.is_chat()) {
        sink.progress(progress_message(intent)).await?;

        let result = executor::execute(state, intent, user).await.map_err(TurnError::Internal)?;
        if result.kind == "navigate" && result.status == ActionStatus::Success {
            navigate_to = navigate_to.or_else(|| result.target.clone());
        }
        actions.push(result);
    }

    let answer = if let Some(answer) = classification.answer {
        sink.chunk(answer.clone()).await?;
        answer
    } else if actions.is_empty() {
        answer_chat(state, user, message, sink).await?
    } else {
        let summary = summarize_actions(&actions);
        sink.chunk(summary.clone()).await?;
        summary
    };

    Ok(TurnOutcome { answer, navigate_to, actions })
}

fn progress_message(intent: &intent::Intent) -> String {
    match intent.kind() {
        "navigate" => "Finding the right page".to_string(),
        "create_question" => "Drafting questions for the bank".to_string(),
        "create_exam" => "Putting an exam together".to_string(),
        "create_group" => "Setting up the study pack".to_string(),
        "create_user" => "Creating the account".to_string(),
        other => format!("Working on {other}"),
    }
}

/// Conversational answer: streamed from the model when it is reachable, a
/// single deterministic chunk otherwise.
async fn answer_chat(
    state: &AppState,
    user: &User,
    message: &str,
    sink: &EventSink,
) -> Result<String, TurnError> {
    let messages = [
        ChatMessage::system(format!(
            "You are the assistant of an English practice platform. The user is a {}. \
             Answer briefly and helpfully.",
            user.role.as_str()
        )),
        ChatMessage::user(message.to_string()),
    ];

    match state.model().chat_stream(&messages, 0.4).await {
        Ok(stream) => {
            pin_mut!(stream);
            let mut collected = String::new();
            while let Some(delta) = stream.next().await {
                match delta {
                    Ok(delta) => {
                        collected.push_str(&delta);
                        sink.chunk(delta).await?;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Answer stream broke off");
                        break;
                    }
                }
            }
            if collected.is_empty() {
                let answer = fallback::chat_answer(user.role);
                sink.chunk(answer.clone()).await?;
                Ok(answer)
            } else {
                Ok(collected)
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "Chat model unavailable, using offline answer");
            let answer = fallback::chat_answer(user.role);
            sink.chunk(answer.clone()).await?;
            Ok(answer)
        }
    }
}

fn summarize_actions(actions: &[ActionResult]) -> String {
    let lines: Vec<String> = actions
        .iter()
        .filter_map(|action| action.message.clone())
        .collect();
    if lines.is_empty() {
        "Done.".to_string()
    } else {
        lines.join(" ")
    }
}

async fn record_transcript(state: &AppState, user: &User, message: &str, outcome: &TurnOutcome) {
    let actions = serde_json::to_value(&outcome.actions).unwrap_or_default();
    let result = repositories::transcripts::create(
        state.db(),
        repositories::transcripts::CreateTranscript {
            id: &Uuid::new_v4().to_string(),
            user_id: &user.id,
            role: user.role,
            message,
            answer: &outcome.answer,
            actions,
            created_at: primitive_now_utc(),
        },
    )
    .await;

    if let Err(err) = result {
        tracing::warn!(error = %err, user_id = %user.id, "Failed to append assistant transcript");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::UserRole;
    use crate::test_support;

    async fn collect_turn(role: UserRole, message: &str) -> Vec<AssistantEvent> {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let state = test_support::offline_state();
        let user = test_support::fake_user(role);

        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(run_turn(state, user, message.to_string(), tx));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        handle.await.expect("turn task");
        events
    }

    fn assert_single_terminal(events: &[AssistantEvent]) {
        let terminal_count = events.iter().filter(|event| event.is_terminal()).count();
        assert_eq!(terminal_count, 1, "exactly one terminal event: {events:?}");
        assert!(
            events.last().expect("at least one event").is_terminal(),
            "terminal event must close the stream: {events:?}"
        );
    }

    #[tokio::test]
    async fn offline_chat_turn_emits_single_chunk_then_done() {
        let events = collect_turn(UserRole::Student, "how do past participles work?").await;

        assert_single_terminal(&events);
        let chunks: Vec<&AssistantEvent> = events
            .iter()
            .filter(|event| matches!(event, AssistantEvent::Chunk { .. }))
            .collect();
        assert_eq!(chunks.len(), 1, "fallback answers arrive as one chunk");

        match events.last().unwrap() {
            AssistantEvent::Done { answer, navigate_to, actions } => {
                assert_eq!(answer, &fallback::chat_answer(UserRole::Student));
                assert!(navigate_to.is_none());
                assert!(actions.is_empty());
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn student_create_request_is_rejected_without_side_effects() {
        let events = collect_turn(UserRole::Student, "create a question").await;

        assert_single_terminal(&events);
        match events.last().unwrap() {
            AssistantEvent::Done { actions, .. } => {
                assert_eq!(actions.len(), 1);
                assert_eq!(actions[0].kind, "create_question");
                assert_eq!(actions[0].status, ActionStatus::Forbidden);
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn teacher_navigation_reaches_the_question_bank() {
        let events = collect_turn(UserRole::Teacher, "go to the question bank").await;

        assert_single_terminal(&events);
        match events.last().unwrap() {
            AssistantEvent::Done { navigate_to, actions, .. } => {
                assert_eq!(navigate_to.as_deref(), Some("/admin/questions"));
                assert_eq!(actions.len(), 1);
                assert_eq!(actions[0].kind, "navigate");
                assert_eq!(actions[0].status, ActionStatus::Success);
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chunks_never_follow_the_terminal_event() {
        for (role, message) in [
            (UserRole::Student, "hello there"),
            (UserRole::Teacher, "go to the exams"),
            (UserRole::Student, "create an exam called Sneaky with 4 questions"),
        ] {
            let events = collect_turn(role, message).await;
            assert_single_terminal(&events);
            let terminal_at =
                events.iter().position(AssistantEvent::is_terminal).expect("terminal");
            assert!(
                events[terminal_at + 1..].is_empty(),
                "no events after terminal for {message:?}"
            );
        }
    }

    #[tokio::test]
    async fn abandoned_turn_stops_quietly() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let state = test_support::offline_state();
        let user = test_support::fake_user(UserRole::Student);

        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        // Must finish without panicking even though nobody is listening.
        run_turn(state, user, "hello there".to_string(), tx).await;
    }
}
