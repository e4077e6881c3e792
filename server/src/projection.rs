use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

use crate::app::AppState;
use crate::responses::Error;
use crate::store::{PlayerWords, SessionRow, SessionStore, WordRow, group_by_player};
use crate::worker::{self, ScoreJob};
use scoring::{ScoredWord, Variant};
use words::BoggleWord;

/// Client-visible session state. Serialised as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    /// Waiting for the first round to be announced.
    Initial,
    /// A round is announced but play hasn't started.
    PreStart,
    /// The round is underway.
    Playing,
    /// Waiting for stragglers or for the scorer.
    Scoring,
    /// Scores for the current round are in.
    Scored,
}

impl Status {
    fn code(self) -> u8 {
        match self {
            Status::Initial => 0,
            Status::PreStart => 1,
            Status::Playing => 2,
            Status::Scoring => 3,
            Status::Scored => 4,
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PlayerInfo {
    pub(crate) player_id: i32,
    pub(crate) name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PlayerScores {
    pub(crate) player: PlayerInfo,
    pub(crate) words: Vec<scoring::EffectiveWord>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StateResponse {
    created: String,
    players: Vec<PlayerInfo>,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    round_no: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    round_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    round_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    board: Option<board::Board>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scores: Option<Vec<PlayerScores>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatsResponse {
    total_scores: Vec<TotalScore>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TotalScore {
    player: PlayerInfo,
    total_score: i32,
}

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Decide the visible status of a started round and whether this read should
/// hand the round to the scorer. Scoring is triggered once everyone is in,
/// or once the grace period after round end has lapsed; inside the grace
/// window stragglers may still submit, so the round is left unclaimed.
fn round_phase(
    sess: &SessionRow,
    all_submitted: bool,
    now: DateTime<Utc>,
    grace_period: Duration,
) -> (Status, bool) {
    let Some(start) = sess.round_start else {
        return (Status::Initial, false);
    };
    if sess.round_scored == Some(true) {
        return (Status::Scored, false);
    }
    if now < start {
        return (Status::PreStart, false);
    }
    let end = start + Duration::minutes(sess.round_minutes as i64);
    let dispatch = sess.round_scored.is_none() && (all_submitted || now > end + grace_period);
    let status = if now < end && !all_submitted {
        Status::Playing
    } else {
        Status::Scoring
    };
    (status, dispatch)
}

/// Assemble the client view of a session: status, round window, the board
/// rolled deterministically from the round seed, and scores once they are
/// in. Reads opportunistically kick off scoring when the round is complete.
pub(crate) async fn session_state<S: SessionStore>(
    state: &AppState<S>,
    session_id: i32,
    pepper: &str,
) -> Result<StateResponse, Error> {
    let mut sess = state.store.load_session(session_id).await?;
    let players = state.store.players(session_id).await?;
    let mut response = StateResponse {
        created: fmt_ts(sess.created),
        players: players
            .into_iter()
            .map(|p| PlayerInfo {
                player_id: p.id,
                name: p.name,
            })
            .collect(),
        status: Status::Initial,
        round_no: None,
        round_start: None,
        round_end: None,
        board: None,
        scores: None,
    };
    let Some(start) = sess.round_start else {
        return Ok(response);
    };

    let round_no = sess.round_no;
    response.round_no = Some(round_no);
    response.round_start = Some(fmt_ts(start));
    if let Some(end) = sess.round_end() {
        response.round_end = Some(fmt_ts(end));
    }

    let now = Utc::now();
    let all_in = state.store.all_submitted(session_id, round_no).await?;
    let (mut status, should_dispatch) =
        round_phase(&sess, all_in, now, state.config.grace_period);
    if should_dispatch {
        let job = ScoreJob {
            session_id,
            round_no,
            seed: state.minter.round_seed(round_no, pepper),
            dice_config: sess.dice_config.clone(),
        };
        worker::dispatch(state, job).await;
        // the job may have completed synchronously; refresh our view
        sess = state.store.load_session(session_id).await?;
        (status, _) = round_phase(&sess, all_in, now, state.config.grace_period);
    }
    response.status = status;

    if now >= start {
        response.board = Some(roll_board(state, &sess, pepper)?);
    }
    if status == Status::Scored {
        let groups = state.store.round_words(session_id, round_no).await?;
        response.scores = Some(project_scores(
            &groups,
            Variant::from_mild_flag(sess.mild_scoring),
        ));
    }
    Ok(response)
}

/// Per-player score totals over every round of the session.
pub(crate) async fn session_stats<S: SessionStore>(
    state: &AppState<S>,
    session_id: i32,
) -> Result<StatsResponse, Error> {
    let sess = state.store.load_session(session_id).await?;
    let variant = Variant::from_mild_flag(sess.mild_scoring);
    let rows = state.store.session_words(session_id).await?;

    let mut rounds: Vec<Vec<(crate::store::PlayerRow, WordRow)>> = Vec::new();
    let mut current_round = None;
    for row in rows {
        if current_round != Some(row.round_no) {
            current_round = Some(row.round_no);
            rounds.push(Vec::new());
        }
        if let Some(round) = rounds.last_mut() {
            round.push((row.player, row.word));
        }
    }

    // the bonus is a per-round property, so project round by round
    let mut totals: std::collections::BTreeMap<i32, (String, i32)> = Default::default();
    for round in rounds {
        for scores in project_scores(&group_by_player(round), variant) {
            let entry = totals
                .entry(scores.player.player_id)
                .or_insert((scores.player.name, 0));
            entry.1 += scores.words.iter().map(|w| w.score).sum::<i32>();
        }
    }
    Ok(StatsResponse {
        total_scores: totals
            .into_iter()
            .map(|(player_id, (name, total_score))| TotalScore {
                player: PlayerInfo { player_id, name },
                total_score,
            })
            .collect(),
    })
}

fn roll_board<S>(
    state: &AppState<S>,
    sess: &SessionRow,
    pepper: &str,
) -> Result<board::Board, Error> {
    let dice = state.dice.get(&sess.dice_config).ok_or_else(|| {
        Error::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Dice config {:?} is not available", sess.dice_config),
        )
    })?;
    board::roll(state.minter.round_seed(sess.round_no, pepper), &dice, None)
        .map_err(|e| Error::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

pub(crate) fn project_scores(groups: &[PlayerWords], variant: Variant) -> Vec<PlayerScores> {
    let stored: Vec<Vec<ScoredWord>> = groups
        .iter()
        .map(|group| group.words.iter().map(row_to_scored).collect())
        .collect();
    let effective = scoring::effective_scores(&stored, variant);
    groups
        .iter()
        .zip(effective)
        .map(|(group, word_scores)| PlayerScores {
            player: PlayerInfo {
                player_id: group.player.id,
                name: group.player.name.clone(),
            },
            words: word_scores,
        })
        .collect()
}

fn row_to_scored(row: &WordRow) -> ScoredWord {
    ScoredWord {
        word: BoggleWord::new(&row.word),
        score: row.score.unwrap_or(0),
        duplicate: row.duplicate.unwrap_or(false),
        // an unconfigured or failed dictionary means everything passes
        dictionary_valid: row.dictionary_valid.unwrap_or(true),
        path: row
            .path
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok()),
    }
}
