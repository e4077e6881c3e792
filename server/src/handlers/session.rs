use axum::extract::rejection::JsonRejection;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::{MAX_NAME_LENGTH, check_invite_token};
use crate::app::AppState;
use crate::projection;
use crate::responses::Error;
use crate::store::{NewSession, SessionStore};
use crate::tokens::TokenMinter;

/// List the dictionaries and dice sets sessions can be spawned with.
pub(crate) async fn options<S: SessionStore>(State(state): State<AppState<S>>) -> Response {
    Json(json!({
        "dictionaries": state.dictionaries.names(),
        "dice_configs": state.dice.names(),
    }))
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreateRequest {
    dice_config: Option<String>,
    /// Absent means "pick the default"; an explicit null opts out of
    /// dictionary gating even when a default exists.
    #[serde(default, deserialize_with = "explicit_null")]
    dictionary: Option<Option<String>>,
    #[serde(default)]
    mild_scoring: bool,
    round_minutes: Option<i32>,
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

pub(crate) async fn create<S: SessionStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Response {
    // a request without a body just gets the defaults
    let form = body.map(|Json(form)| form).unwrap_or_default();

    let dice_config = form
        .dice_config
        .unwrap_or_else(|| game_config::DEFAULT_DICE_CONFIG.to_owned());
    if !state.dice.contains(&dice_config) {
        return Error::not_found("Unknown dice config").into_response();
    }
    let dictionary = match form.dictionary {
        Some(choice) => choice,
        None => state.dictionaries.default_name().map(str::to_owned),
    };
    if let Some(name) = &dictionary
        && !state.dictionaries.contains(name)
    {
        return Error::not_found("Unknown dictionary").into_response();
    }
    let round_minutes = form
        .round_minutes
        .unwrap_or(state.config.default_round_minutes);
    if round_minutes < 1 {
        return Error::bad_request("Round duration must be positive").into_response();
    }

    let new = NewSession {
        dice_config,
        dictionary,
        round_minutes,
        mild_scoring: form.mild_scoring,
    };
    match state.store.create_session(new).await {
        Ok(sess) => {
            let pepper = TokenMinter::pepper();
            (
                StatusCode::CREATED,
                Json(json!({
                    "session_id": sess.id,
                    "pepper": pepper,
                    "session_mgmt_token": state.minter.mgmt_token(sess.id, &pepper),
                    "session_token": state.minter.invite_token(sess.id, &pepper),
                })),
            )
                .into_response()
        }
        Err(e) => Error::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct JoinRequest {
    name: String,
}

pub(crate) async fn join<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path((session_id, pepper, inv_token)): Path<(i32, String, String)>,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> Response {
    if let Err(e) = check_invite_token(&state, session_id, &pepper, &inv_token) {
        return e.into_response();
    }
    let Ok(Json(form)) = body else {
        return Error::bad_request("A player name is required").into_response();
    };
    let name: String = form.name.chars().take(MAX_NAME_LENGTH).collect();
    match state.store.add_player(session_id, name).await {
        Ok(player) => (
            StatusCode::CREATED,
            Json(json!({
                "player_id": player.id,
                "player_token": state.minter.player_token(session_id, &pepper, player.id),
                "name": player.name,
            })),
        )
            .into_response(),
        Err(e) => Error::from(e).into_response(),
    }
}

pub(crate) async fn stats<S: SessionStore>(
    State(state): State<AppState<S>>,
    Path((session_id, pepper, inv_token)): Path<(i32, String, String)>,
) -> Response {
    if let Err(e) = check_invite_token(&state, session_id, &pepper, &inv_token) {
        return e.into_response();
    }
    if !state.config.stats_enabled {
        return Error::new(
            StatusCode::NOT_IMPLEMENTED,
            "Statistics are disabled".to_owned(),
        )
        .into_response();
    }
    match projection::session_stats(&state, session_id).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => e.into_response(),
    }
}
