use chrono::{DateTime, Duration, Utc};

pub(crate) mod pg;

#[cfg(test)]
pub(crate) mod mem;

/// Parameters for spawning a session.
#[derive(Debug, Clone)]
pub(crate) struct NewSession {
    pub(crate) dice_config: String,
    pub(crate) dictionary: Option<String>,
    pub(crate) round_minutes: i32,
    pub(crate) mild_scoring: bool,
}

/// One row of the session table. `round_scored` is tri-state: `None` means
/// no scoring has been claimed for the current round, `Some(false)` means a
/// worker is computing, `Some(true)` means scores are committed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SessionRow {
    pub(crate) id: i32,
    pub(crate) created: DateTime<Utc>,
    pub(crate) dice_config: String,
    pub(crate) dictionary: Option<String>,
    pub(crate) round_minutes: i32,
    pub(crate) mild_scoring: bool,
    pub(crate) round_no: i32,
    pub(crate) round_start: Option<DateTime<Utc>>,
    pub(crate) round_scored: Option<bool>,
}

impl SessionRow {
    pub(crate) fn round_end(&self) -> Option<DateTime<Utc>> {
        self.round_start
            .map(|start| start + Duration::minutes(self.round_minutes as i64))
    }

    /// Last instant at which submissions are still admitted.
    pub(crate) fn submit_deadline(&self, grace_period: Duration) -> Option<DateTime<Utc>> {
        self.round_end().map(|end| end + grace_period)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PlayerRow {
    pub(crate) id: i32,
    pub(crate) name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct WordRow {
    pub(crate) id: i32,
    pub(crate) word: String,
    pub(crate) score: Option<i32>,
    pub(crate) duplicate: Option<bool>,
    pub(crate) dictionary_valid: Option<bool>,
    /// JSON-encoded cell list, kept as text since it is only replayed to
    /// clients.
    pub(crate) path: Option<String>,
}

/// One player's words for a round, in word order.
#[derive(Debug, Clone)]
pub(crate) struct PlayerWords {
    pub(crate) player: PlayerRow,
    pub(crate) words: Vec<WordRow>,
}

/// A word row with its owning round and player, for cross-round reads.
#[derive(Debug, Clone)]
pub(crate) struct SessionWord {
    pub(crate) round_no: i32,
    pub(crate) player: PlayerRow,
    pub(crate) word: WordRow,
}

/// Scoring outputs written back by the worker.
#[derive(Debug, Clone)]
pub(crate) struct WordUpdate {
    pub(crate) id: i32,
    pub(crate) score: i32,
    pub(crate) duplicate: bool,
    pub(crate) dictionary_valid: bool,
    pub(crate) path: Option<String>,
}

/// Outcome of a worker's attempt to claim the current round for scoring.
#[derive(Debug)]
pub(crate) enum Claim {
    /// The claim was taken; `round_scored` is now `false`.
    Claimed(SessionRow),
    /// Another worker is computing.
    Busy,
    /// Scores are already committed.
    Done,
    /// The session no longer exists.
    Gone,
}

#[derive(Debug)]
pub(crate) enum StoreError {
    SessionGone,
    PlayerGone,
    RoundNotStarted,
    RoundOver,
    WrongRound { supplied: i32, current: i32 },
    AlreadySubmitted,
    MidScoring,
    NoPlayers,
    Db(Box<dyn std::error::Error + Send + Sync>),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::SessionGone => write!(f, "Session no longer exists"),
            StoreError::PlayerGone => write!(f, "Player no longer exists"),
            StoreError::RoundNotStarted => write!(f, "Round not started"),
            StoreError::RoundOver => write!(f, "Round already ended"),
            StoreError::WrongRound { supplied, current } => {
                write!(f, "Wrong round {}, currently round {}", supplied, current)
            }
            StoreError::AlreadySubmitted => write!(f, "You can only submit once"),
            StoreError::MidScoring => write!(f, "Not allowed while scores are being computed"),
            StoreError::NoPlayers => write!(f, "Session has no players"),
            StoreError::Db(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Db(Box::new(e))
    }
}

/// Persistent session state behind the row-locked transitions of the round
/// state machine. Every method is one transaction; methods that decide a
/// write based on session state take an exclusive row lock on the session
/// for the duration of the transaction.
pub(crate) trait SessionStore: Clone + Send + Sync + 'static {
    fn create_session(
        &self,
        new: NewSession,
    ) -> impl Future<Output = Result<SessionRow, StoreError>> + Send;

    /// Non-locking read of the session row.
    fn load_session(
        &self,
        session_id: i32,
    ) -> impl Future<Output = Result<SessionRow, StoreError>> + Send;

    fn destroy_session(
        &self,
        session_id: i32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Start the next round at `round_start`. Rejected while scoring is in
    /// flight and on sessions without players.
    fn advance_round(
        &self,
        session_id: i32,
        round_start: DateTime<Utc>,
    ) -> impl Future<Output = Result<SessionRow, StoreError>> + Send;

    fn add_player(
        &self,
        session_id: i32,
        name: String,
    ) -> impl Future<Output = Result<PlayerRow, StoreError>> + Send;

    /// Leaving is rejected mid-scoring; the scorer assumes the player set of
    /// a claimed round is stable.
    fn remove_player(
        &self,
        session_id: i32,
        player_id: i32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn players(
        &self,
        session_id: i32,
    ) -> impl Future<Output = Result<Vec<PlayerRow>, StoreError>> + Send;

    /// Record a player's words for a round. At most one submission per
    /// player and round; repeats within the word list are collapsed.
    fn submit(
        &self,
        session_id: i32,
        player_id: i32,
        round_no: i32,
        submitted: Vec<String>,
        now: DateTime<Utc>,
        grace_period: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Whether every player of the session has a submission for the round.
    fn all_submitted(
        &self,
        session_id: i32,
        round_no: i32,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn claim_scoring(
        &self,
        session_id: i32,
    ) -> impl Future<Output = Result<Claim, StoreError>> + Send;

    /// All words of a round grouped per player, players in join order and
    /// words alphabetical.
    fn round_words(
        &self,
        session_id: i32,
        round_no: i32,
    ) -> impl Future<Output = Result<Vec<PlayerWords>, StoreError>> + Send;

    /// Write scoring outputs and mark the round scored.
    fn commit_scores(
        &self,
        session_id: i32,
        updates: Vec<WordUpdate>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Mark the given display forms dictionary-valid for a round.
    fn approve_words(
        &self,
        session_id: i32,
        round_no: i32,
        approved: Vec<String>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every word of the session, ordered by round, player, word.
    fn session_words(
        &self,
        session_id: i32,
    ) -> impl Future<Output = Result<Vec<SessionWord>, StoreError>> + Send;
}

/// Advance precondition: no scoring in flight, at least one player.
fn check_advance(sess: &SessionRow, player_count: i64) -> Result<(), StoreError> {
    if sess.round_scored == Some(false) {
        return Err(StoreError::MidScoring);
    }
    if player_count == 0 {
        return Err(StoreError::NoPlayers);
    }
    Ok(())
}

/// Submit preconditions, in the order clients observe them: the round must
/// be underway (not unstarted, not claimed for scoring, not past the grace
/// deadline) and the submission must target the current round.
pub(crate) fn check_submit(
    sess: &SessionRow,
    round_no: i32,
    now: DateTime<Utc>,
    grace_period: Duration,
) -> Result<(), StoreError> {
    let Some(deadline) = sess.submit_deadline(grace_period) else {
        return Err(StoreError::RoundNotStarted);
    };
    if sess.round_scored.is_some() || now > deadline {
        return Err(StoreError::RoundOver);
    }
    if round_no != sess.round_no {
        return Err(StoreError::WrongRound {
            supplied: round_no,
            current: sess.round_no,
        });
    }
    Ok(())
}

/// Fold a (player, word) scan ordered by player into per-player groups.
pub(crate) fn group_by_player(rows: Vec<(PlayerRow, WordRow)>) -> Vec<PlayerWords> {
    let mut out: Vec<PlayerWords> = Vec::new();
    for (player, word) in rows {
        match out.last_mut() {
            Some(group) if group.player.id == player.id => group.words.push(word),
            _ => out.push(PlayerWords {
                player,
                words: vec![word],
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(round_scored: Option<bool>) -> SessionRow {
        SessionRow {
            id: 1,
            created: Utc::now(),
            dice_config: "International".to_owned(),
            dictionary: None,
            round_minutes: 3,
            mild_scoring: false,
            round_no: 1,
            round_start: Some(Utc::now()),
            round_scored,
        }
    }

    #[test]
    fn advance_needs_players_and_no_scoring_in_flight() {
        assert!(check_advance(&session(None), 1).is_ok());
        assert!(check_advance(&session(Some(true)), 1).is_ok());
        assert!(matches!(
            check_advance(&session(Some(false)), 1),
            Err(StoreError::MidScoring)
        ));
        assert!(matches!(
            check_advance(&session(None), 0),
            Err(StoreError::NoPlayers)
        ));
    }

    #[test]
    fn submit_window_checks_run_before_round_match() {
        let now = Utc::now();
        let grace = Duration::seconds(10);

        let mut sess = session(None);
        sess.round_start = None;
        assert!(matches!(
            check_submit(&sess, 1, now, grace),
            Err(StoreError::RoundNotStarted)
        ));

        let sess = session(Some(false));
        assert!(matches!(
            check_submit(&sess, 1, now, grace),
            Err(StoreError::RoundOver)
        ));

        let mut sess = session(None);
        sess.round_start = Some(now - Duration::minutes(4));
        assert!(matches!(
            check_submit(&sess, 1, now, grace),
            Err(StoreError::RoundOver)
        ));

        // the deadline check wins over the round number check
        let sess = session(Some(true));
        assert!(matches!(
            check_submit(&sess, 27, now, grace),
            Err(StoreError::RoundOver)
        ));

        let sess = session(None);
        assert!(matches!(
            check_submit(&sess, 27, now, grace),
            Err(StoreError::WrongRound {
                supplied: 27,
                current: 1
            })
        ));
        assert!(check_submit(&sess, 1, now, grace).is_ok());
    }

    #[test]
    fn grouping_folds_a_player_ordered_scan() {
        let word = |id: i32, w: &str| WordRow {
            id,
            word: w.to_owned(),
            score: None,
            duplicate: None,
            dictionary_valid: None,
            path: None,
        };
        let p1 = PlayerRow {
            id: 1,
            name: "ada".to_owned(),
        };
        let p2 = PlayerRow {
            id: 2,
            name: "grace".to_owned(),
        };
        let grouped = group_by_player(vec![
            (p1.clone(), word(1, "ALGE")),
            (p1.clone(), word(2, "TLEGI")),
            (p2.clone(), word(3, "ALGE")),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].words.len(), 2);
        assert_eq!(grouped[1].player.id, 2);
        assert_eq!(grouped[1].words[0].word, "ALGE");
    }
}
