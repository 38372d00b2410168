//! HTTP routes.
//!
//! | Route               | Effect                                   | Success |
//! |---------------------|------------------------------------------|---------|
//! | `GET /reset/{name}` | replace history with the named puzzle    | 302     |
//! | `GET /api/`         | current squares                          | 200     |
//! | `GET /api/back`     | step history back, then current squares  | 200     |
//! | `POST /api/assign`  | assignment protocol, then squares        | 200     |
//! | `GET /api/state`    | raw values, cursor and history depth     | 200     |
//!
//! Every response, including rejections, carries `Set-Cookie` when the
//! request minted a session.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use susen_puzzle::{Choice, Condition, PuzzleError};
use susen_wire::{ChoiceBody, ErrorBody, StateBody};
use tracing::{debug, error, info};

use crate::AppState;
use crate::assign::assign;
use crate::cookie::NegotiationError;
use crate::session::Session;

/// Build the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/reset/{puzzle}", get(reset))
        .route("/api", get(current_squares))
        .route("/api/", get(current_squares))
        .route("/api/back", get(back))
        .route("/api/back/", get(back))
        .route("/api/assign", post(assign_choice))
        .route("/api/state", get(current_state))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Handler failure, mapped to a status and body in one place.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Puzzle(#[from] PuzzleError),

    #[error("malformed choice: {0}")]
    MalformedChoice(String),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Puzzle(err) => {
                let status = if err.condition == Condition::PuzzleNotFound {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::BAD_REQUEST
                };
                (status, Json(ErrorBody::from(&err))).into_response()
            }
            Self::MalformedChoice(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::malformed_choice(message)),
            )
                .into_response(),
            Self::Negotiation(err) => {
                error!(error = %err, "failed to resolve a session");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("session unavailable: {err}"),
                )
                    .into_response()
            }
        }
    }
}

// ============================================================================
// Session Extractor
// ============================================================================

/// The request's session, resolved by the cookie negotiator.
pub struct SessionContext {
    pub session: Arc<Session>,
    set_cookie: Option<HeaderValue>,
}

impl FromRequestParts<AppState> for SessionContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let resolution = state
            .negotiator
            .resolve(&state.store, &parts.headers, parts.uri.scheme_str())?;
        Ok(Self {
            session: resolution.session,
            set_cookie: resolution.set_cookie,
        })
    }
}

impl SessionContext {
    fn short_id(&self) -> &str {
        self.session.id().short()
    }

    /// Turn a handler result into a response, attaching `Set-Cookie` if this
    /// request minted the session.
    fn respond(self, result: Result<impl IntoResponse, ApiError>) -> Response {
        let mut response = match result {
            Ok(body) => body.into_response(),
            Err(err) => err.into_response(),
        };
        if let Some(cookie) = self.set_cookie {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        response
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn reset(
    State(state): State<AppState>,
    Path(puzzle): Path<String>,
    ctx: SessionContext,
) -> Response {
    let result = match state.engine.initial_snapshot(&puzzle) {
        Ok(root) => {
            ctx.session.reset(root);
            info!(session = %ctx.short_id(), puzzle = %puzzle, "session reset");
            Ok((StatusCode::FOUND, [(LOCATION, state.ui_path.to_string())]))
        }
        Err(err) => {
            debug!(session = %ctx.short_id(), puzzle = %puzzle, "reset to unknown puzzle");
            Err(ApiError::from(err))
        }
    };
    ctx.respond(result)
}

async fn current_squares(ctx: SessionContext) -> Response {
    let squares = susen_wire::squares(&ctx.session.current());
    ctx.respond(Ok::<_, ApiError>(Json(squares)))
}

async fn back(ctx: SessionContext) -> Response {
    let (stepped, current) = ctx
        .session
        .update(|history| (history.back(), history.current().clone()));
    debug!(session = %ctx.short_id(), stepped, "history back");
    let squares = susen_wire::squares(&current);
    ctx.respond(Ok::<_, ApiError>(Json(squares)))
}

async fn assign_choice(
    State(state): State<AppState>,
    ctx: SessionContext,
    body: Result<Json<ChoiceBody>, JsonRejection>,
) -> Response {
    let result = match body {
        Err(rejection) => {
            debug!(session = %ctx.short_id(), reason = %rejection.body_text(), "malformed choice");
            Err(ApiError::MalformedChoice(rejection.body_text()))
        }
        Ok(Json(body)) => Choice::try_from(body)
            .and_then(|choice| {
                let squares = assign(&ctx.session, state.engine.as_ref(), choice)?;
                info!(
                    session = %ctx.short_id(),
                    index = choice.index,
                    value = choice.value,
                    "assigned"
                );
                Ok(squares)
            })
            .map(|squares| {
                Json(
                    squares
                        .into_iter()
                        .map(susen_wire::SquareBody::from)
                        .collect::<Vec<_>>(),
                )
            })
            .map_err(|err| {
                debug!(
                    session = %ctx.short_id(),
                    condition = %err.condition,
                    "assignment rejected"
                );
                ApiError::from(err)
            }),
    };
    ctx.respond(result)
}

async fn current_state(ctx: SessionContext) -> Response {
    let state = ctx
        .session
        .view(|history| StateBody::new(history.current(), history.cursor(), history.depth()));
    ctx.respond(Ok::<_, ApiError>(Json(state)))
}
