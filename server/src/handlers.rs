pub(crate) mod manage;
pub(crate) mod play;
pub(crate) mod session;

use crate::app::AppState;
use crate::responses::Error;
use crate::tokens::tokens_match;

pub(crate) const MAX_NAME_LENGTH: usize = 250;
pub(crate) const MAX_WORD_LENGTH: usize = 20;

fn check_mgmt_token<S>(
    state: &AppState<S>,
    session_id: i32,
    pepper: &str,
    token: &str,
) -> Result<(), Error> {
    if !tokens_match(&state.minter.mgmt_token(session_id, pepper), token) {
        return Err(Error::forbidden("Bad session management token"));
    }
    Ok(())
}

fn check_invite_token<S>(
    state: &AppState<S>,
    session_id: i32,
    pepper: &str,
    token: &str,
) -> Result<(), Error> {
    if !tokens_match(&state.minter.invite_token(session_id, pepper), token) {
        return Err(Error::forbidden("Bad session token"));
    }
    Ok(())
}

fn check_player_token<S>(
    state: &AppState<S>,
    session_id: i32,
    pepper: &str,
    player_id: i32,
    token: &str,
) -> Result<(), Error> {
    if !tokens_match(
        &state.minter.player_token(session_id, pepper, player_id),
        token,
    ) {
        return Err(Error::forbidden("Bad player token"));
    }
    Ok(())
}
