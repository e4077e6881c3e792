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

use super::{MAX_WORD_LENGTH, check_player_token};
use crate::app::AppState;
use crate::projection;
use crate::responses::Error;
use crate::store::SessionStore;
use words::BoggleWord;

pub(crate) async fn state_view<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path((session_id, pepper, player_id, player_token)): Path<(i32, String, i32, String)>,
) -> Response {
    if let Err(e) = check_player_token(&state, session_id, &pepper, player_id, &player_token) {
        return e.into_response();
    }
    match projection::session_state(&state, session_id, &pepper).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    round_no: i32,
    words: Vec<String>,
}

pub(crate) async fn submit<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path((session_id, pepper, player_id, player_token)): Path<(i32, String, i32, String)>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    if let Err(e) = check_player_token(&state, session_id, &pepper, player_id, &player_token) {
        return e.into_response();
    }
    let Ok(Json(form)) = body else {
        // state violations outrank payload problems in the reported error
        return submit_preflight(&state, session_id, player_id)
            .await
            .into_response();
    };

    // normalise up front: repeats (QU and Q spellings included) collapse, and
    // anything that folds away to nothing is dropped
    let submitted: Vec<String> = words::dedup(form.words.iter().map(|raw| BoggleWord::new(raw)))
        .into_iter()
        .map(|word| {
            let mut display = word.display().to_owned();
            display.truncate(MAX_WORD_LENGTH);
            display
        })
        .filter(|display| !display.is_empty())
        .collect();

    match state
        .store
        .submit(
            session_id,
            player_id,
            form.round_no,
            submitted,
            Utc::now(),
            state.config.grace_period,
        )
        .await
    {
        Ok(()) => (StatusCode::CREATED, Json(json!({}))).into_response(),
        Err(e) => Error::from(e).into_response(),
    }
}

/// Best-effort reproduction of the store's own check order for a submission
/// whose body never parsed: session gone and player gone beat the round
/// window checks, which beat the payload complaint.
async fn submit_preflight<S: SessionStore>(
    state: &AppState<S>,
    session_id: i32,
    player_id: i32,
) -> Error {
    let sess = match state.store.load_session(session_id).await {
        Ok(sess) => sess,
        Err(e) => return e.into(),
    };
    match state.store.players(session_id).await {
        Ok(players) if !players.iter().any(|p| p.id == player_id) => {
            return crate::store::StoreError::PlayerGone.into();
        }
        Err(e) => return e.into(),
        Ok(_) => {}
    }
    if let Err(e) = crate::store::check_submit(
        &sess,
        sess.round_no,
        Utc::now(),
        state.config.grace_period,
    ) {
        return e.into();
    }
    Error::bad_request("Malformed submission data")
}

pub(crate) async fn leave<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path((session_id, pepper, player_id, player_token)): Path<(i32, String, i32, String)>,
) -> Response {
    if let Err(e) = check_player_token(&state, session_id, &pepper, player_id, &player_token) {
        return e.into_response();
    }
    match state.store.remove_player(session_id, player_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => Error::from(e).into_response(),
    }
}
