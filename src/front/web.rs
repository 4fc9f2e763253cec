//! Web front end - a small axum app over the card supply.
//!
//! One page, three endpoints: `POST /next` draws a question, `POST
//! /answer` reveals the current card, `POST /shutdown` stops the server
//! when the config allows it. The page talks JSON to the endpoints.

use crate::models::{Card, Result, TriviumError, WebConfig};
use crate::source::CardSupply;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info};

/// How long `/next` waits when the pool has nothing ready yet.
const EMPTY_POOL_WAIT: Duration = Duration::from_secs(1);

#[derive(Default)]
struct WebSession {
    current: Option<Card>,
    revealed: bool,
}

struct AppState {
    supply: CardSupply,
    session: Mutex<WebSession>,
    allow_shutdown: bool,
    shutdown: Notify,
}

#[derive(Serialize)]
struct QuestionResponse {
    question: String,
}

#[derive(Debug, Serialize)]
struct AnswerResponse {
    answer: String,
    explanation: String,
}

#[derive(Debug, Serialize)]
struct ShutdownResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Bind the configured address and serve until shutdown.
pub async fn serve(supply: CardSupply, config: &WebConfig) -> Result<()> {
    supply.start().await;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| TriviumError::io(format!("binding {addr}"), e))?;

    let state = Arc::new(AppState {
        supply,
        session: Mutex::new(WebSession::default()),
        allow_shutdown: config.allow_shutdown,
        shutdown: Notify::new(),
    });

    info!(addr = %addr, "Serving web front end");
    serve_on(listener, state).await
}

async fn serve_on(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let app = router(state.clone());

    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
            _ = state.shutdown.notified() => info!("Shutdown requested over HTTP"),
        }
        state.supply.stop();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| TriviumError::io("serving HTTP", e))?;

    info!("Web front end stopped");
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/next", post(next_card))
        .route("/answer", post(reveal_answer))
        .route("/shutdown", post(shutdown))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(PAGE)
}

async fn next_card(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<QuestionResponse>, ApiError> {
    match state.supply.draw(EMPTY_POOL_WAIT).await {
        Ok(card) => {
            let mut session = state.session.lock().await;
            let question = card.question().to_string();
            session.current = Some(card);
            session.revealed = false;
            Ok(Json(QuestionResponse { question }))
        }
        Err(TriviumError::Timeout(_)) | Err(TriviumError::EmptyPool) => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "The question pool is refilling in the background - try again in a moment.",
        )),
        Err(err) => {
            error!(error = %err, "Drawing a card failed");
            Err(api_error(
                StatusCode::BAD_GATEWAY,
                "Could not produce a valid card. Try again.",
            ))
        }
    }
}

async fn reveal_answer(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<AnswerResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let Some(card) = session.current.clone() else {
        return Err(api_error(
            StatusCode::CONFLICT,
            "No active question. Draw one first.",
        ));
    };
    session.revealed = true;

    Ok(Json(AnswerResponse {
        answer: card.answer_text(),
        explanation: card.explanation().to_string(),
    }))
}

async fn shutdown(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<ShutdownResponse>, ApiError> {
    if !state.allow_shutdown {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Shutdown over HTTP is disabled.",
        ));
    }

    state.supply.stop();
    state.shutdown.notify_one();
    Ok(Json(ShutdownResponse {
        status: "shutting down",
    }))
}

const PAGE: &str = r##"<!doctype html>
<html lang='en'>
<head>
  <meta charset='utf-8' />
  <meta name='viewport' content='width=device-width, initial-scale=1' />
  <title>Numeric trivia</title>
  <style>
    body { font-family: system-ui, -apple-system, Segoe UI, Roboto, Arial; margin: 24px; max-width: 900px; }
    .row { display: flex; gap: 12px; flex-wrap: wrap; margin-bottom: 16px; }
    button { padding: 10px 14px; font-size: 16px; cursor: pointer; }
    .card { border: 1px solid #ddd; border-radius: 10px; padding: 14px; margin: 12px 0; }
    .muted { color: #666; background: #fafafa; }
    .content { font-size: 18px; line-height: 1.4; white-space: pre-wrap; }
    .error { background: #ffecec; border: 1px solid #ffb3b3; padding: 10px; border-radius: 10px; }
  </style>
</head>
<body>
  <h1>Numeric trivia</h1>
  <div id='error' class='error' hidden></div>

  <div class='row'>
    <button id='next'>Next question</button>
    <button id='answer'>Show answer</button>
  </div>

  <div class='card'>
    <h2>Question</h2>
    <div id='question' class='content'><em>No active question. Press 'Next question'.</em></div>
  </div>
  <div class='card muted'>
    <h2>Answer</h2>
    <div id='reveal' class='content'>(hidden)</div>
  </div>

  <script>
    const errorBox = document.getElementById('error');
    const questionBox = document.getElementById('question');
    const revealBox = document.getElementById('reveal');

    async function call(path) {
      const response = await fetch(path, { method: 'POST' });
      const body = await response.json();
      if (!response.ok) {
        throw new Error(body.error || response.statusText);
      }
      return body;
    }

    document.getElementById('next').addEventListener('click', async () => {
      try {
        const body = await call('/next');
        errorBox.hidden = true;
        questionBox.textContent = body.question;
        revealBox.textContent = '(hidden)';
      } catch (err) {
        errorBox.textContent = err.message;
        errorBox.hidden = false;
      }
    });

    document.getElementById('answer').addEventListener('click', async () => {
      try {
        const body = await call('/answer');
        errorBox.hidden = true;
        revealBox.textContent = body.answer + '\n' + body.explanation;
      } catch (err) {
        errorBox.textContent = err.message;
        errorBox.hidden = false;
      }
    });
  </script>
</body>
</html>"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CsvDeck;

    fn deck_state(allow_shutdown: bool) -> Arc<AppState> {
        let cards = vec![
            Card::new("How many keys does a grand piano have?", 88.0, "Standard layout.")
                .unwrap(),
        ];
        Arc::new(AppState {
            supply: CardSupply::Deck(CsvDeck::new(cards).unwrap()),
            session: Mutex::new(WebSession::default()),
            allow_shutdown,
            shutdown: Notify::new(),
        })
    }

    #[tokio::test]
    async fn test_next_then_answer() {
        let state = deck_state(false);

        let Json(question) = next_card(State(state.clone())).await.unwrap();
        assert_eq!(question.question, "How many keys does a grand piano have?");

        let Json(answer) = reveal_answer(State(state.clone())).await.unwrap();
        assert_eq!(answer.answer, "88");
        assert_eq!(answer.explanation, "Standard layout.");
        assert!(state.session.lock().await.revealed);
    }

    #[tokio::test]
    async fn test_answer_without_question_conflicts() {
        let state = deck_state(false);

        let (status, _) = reveal_answer(State(state)).await.unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_next_resets_reveal_flag() {
        let state = deck_state(false);

        next_card(State(state.clone())).await.unwrap();
        reveal_answer(State(state.clone())).await.unwrap();
        assert!(state.session.lock().await.revealed);

        next_card(State(state.clone())).await.unwrap();
        assert!(!state.session.lock().await.revealed);
    }

    #[tokio::test]
    async fn test_shutdown_forbidden_by_default() {
        let state = deck_state(false);

        let (status, _) = shutdown(State(state)).await.unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_server_round_trip_and_shutdown() {
        let state = deck_state(true);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(serve_on(listener, state));
        let base = format!("http://{addr}");
        let client = reqwest::Client::new();

        let page = client.get(&base).send().await.unwrap();
        assert_eq!(page.status(), reqwest::StatusCode::OK);
        assert!(page.text().await.unwrap().contains("Numeric trivia"));

        let next = client.post(format!("{base}/next")).send().await.unwrap();
        assert_eq!(next.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = next.json().await.unwrap();
        assert!(body["question"].as_str().unwrap().contains("piano"));

        let answer = client.post(format!("{base}/answer")).send().await.unwrap();
        assert_eq!(answer.status(), reqwest::StatusCode::OK);

        let stop = client.post(format!("{base}/shutdown")).send().await.unwrap();
        assert_eq!(stop.status(), reqwest::StatusCode::OK);

        // graceful shutdown lets serve_on return
        server.await.unwrap().unwrap();
    }
}
