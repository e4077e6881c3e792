use axum::extract::rejection::JsonRejection;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::check_mgmt_token;
use crate::app::AppState;
use crate::projection;
use crate::responses::Error;
use crate::store::SessionStore;

pub(crate) async fn state_view<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path((session_id, pepper, mgmt_token)): Path<(i32, String, String)>,
) -> Response {
    if let Err(e) = check_mgmt_token(&state, session_id, &pepper, &mgmt_token) {
        return e.into_response();
    }
    match projection::session_state(&state, session_id, &pepper).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Announce the next round after the configured countdown.
pub(crate) async fn advance<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path((session_id, pepper, mgmt_token)): Path<(i32, String, String)>,
) -> Response {
    if let Err(e) = check_mgmt_token(&state, session_id, &pepper, &mgmt_token) {
        return e.into_response();
    }
    let round_start = Utc::now() + state.config.countdown;
    match state.store.advance_round(session_id, round_start).await {
        Ok(sess) => (
            StatusCode::OK,
            Json(json!({
                "round_no": sess.round_no,
                "round_start": projection::fmt_ts(round_start),
            })),
        )
            .into_response(),
        Err(e) => Error::from(e).into_response(),
    }
}

pub(crate) async fn destroy<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path((session_id, pepper, mgmt_token)): Path<(i32, String, String)>,
) -> Response {
    if let Err(e) = check_mgmt_token(&state, session_id, &pepper, &mgmt_token) {
        return e.into_response();
    }
    match state.store.destroy_session(session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => Error::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApproveRequest {
    words: Vec<String>,
}

/// Manually mark words of the current round as dictionary-valid, reviving
/// their stored raw score, and report the re-projected state.
pub(crate) async fn approve_word<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path((session_id, pepper, mgmt_token)): Path<(i32, String, String)>,
    body: Result<Json<ApproveRequest>, JsonRejection>,
) -> Response {
    if let Err(e) = check_mgmt_token(&state, session_id, &pepper, &mgmt_token) {
        return e.into_response();
    }
    let Ok(Json(form)) = body else {
        return Error::bad_request("A word list is required").into_response();
    };
    let sess = match state.store.load_session(session_id).await {
        Ok(sess) => sess,
        Err(e) => return Error::from(e).into_response(),
    };
    let approved: Vec<String> = form.words.iter().map(|raw| words::fold(raw)).collect();
    if let Err(e) = state
        .store
        .approve_words(session_id, sess.round_no, approved)
        .await
    {
        return Error::from(e).into_response();
    }
    match projection::session_state(&state, session_id, &pepper).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}
