use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
};

use game_config::{DiceConfigs, Dictionaries};

use crate::config::AppConfig;
use crate::handlers;
use crate::store::SessionStore;
use crate::tokens::TokenMinter;
use crate::worker::Dispatcher;

#[derive(Clone)]
pub(crate) struct AppState<S> {
    pub(crate) store: S,
    pub(crate) config: Arc<AppConfig>,
    pub(crate) minter: Arc<TokenMinter>,
    pub(crate) dice: Arc<DiceConfigs>,
    pub(crate) dictionaries: Arc<Dictionaries>,
    pub(crate) dispatcher: Dispatcher,
}

pub(crate) fn router<S: SessionStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/options", get(handlers::session::options::<S>))
        .route("/session", post(handlers::session::create::<S>))
        .route(
            "/session/{session_id}/{pepper}/manage/{mgmt_token}",
            get(handlers::manage::state_view::<S>)
                .post(handlers::manage::advance::<S>)
                .delete(handlers::manage::destroy::<S>),
        )
        .route(
            "/session/{session_id}/{pepper}/manage/{mgmt_token}/approve_word",
            patch(handlers::manage::approve_word::<S>),
        )
        .route(
            "/session/{session_id}/{pepper}/join/{inv_token}",
            post(handlers::session::join::<S>),
        )
        .route(
            "/session/{session_id}/{pepper}/play/{player_id}/{player_token}",
            get(handlers::play::state_view::<S>)
                .put(handlers::play::submit::<S>)
                .delete(handlers::play::leave::<S>),
        )
        .route(
            "/session/{session_id}/{pepper}/stats/{inv_token}",
            get(handlers::session::stats::<S>),
        )
        .with_state(state)
}
