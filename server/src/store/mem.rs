//! In-memory store used by the test suite. One async mutex stands in for the
//! database's row locks: every operation holds it for the whole transaction,
//! which serialises transitions exactly like `select ... for update` does,
//! while the claim/commit split of the scoring worker still happens in two
//! separate critical sections.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{
    Claim, NewSession, PlayerRow, PlayerWords, SessionRow, SessionStore, SessionWord, StoreError,
    WordRow, WordUpdate, check_advance, check_submit, group_by_player,
};

#[derive(Clone, Default)]
pub(crate) struct MemStore(Arc<Mutex<MemDb>>);

#[derive(Default)]
struct MemDb {
    next_id: i32,
    sessions: BTreeMap<i32, SessionRow>,
    // player id -> (session id, name)
    players: BTreeMap<i32, (i32, String)>,
    // submission id -> (player id, round no)
    submissions: BTreeMap<i32, (i32, i32)>,
    // word id -> (submission id, row)
    words: BTreeMap<i32, (i32, WordRow)>,
}

impl MemDb {
    fn fresh_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn player_count(&self, session_id: i32) -> i64 {
        self.players
            .values()
            .filter(|(sid, _)| *sid == session_id)
            .count() as i64
    }

    fn submission_for(&self, player_id: i32, round_no: i32) -> Option<i32> {
        self.submissions
            .iter()
            .find(|(_, (pid, rno))| *pid == player_id && *rno == round_no)
            .map(|(id, _)| *id)
    }

    /// (player, word) pairs for one round, ordered by player id then word.
    fn owned_words(&self, session_id: i32, round_no: Option<i32>) -> Vec<(i32, PlayerRow, WordRow)> {
        let mut rows: Vec<(i32, PlayerRow, WordRow)> = self
            .words
            .values()
            .filter_map(|(submission_id, word)| {
                let (player_id, rno) = self.submissions.get(submission_id)?;
                if round_no.is_some_and(|want| want != *rno) {
                    return None;
                }
                let (sid, name) = self.players.get(player_id)?;
                (*sid == session_id).then(|| {
                    (
                        *rno,
                        PlayerRow {
                            id: *player_id,
                            name: name.clone(),
                        },
                        word.clone(),
                    )
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            (a.0, a.1.id, &a.2.word).cmp(&(b.0, b.1.id, &b.2.word))
        });
        rows
    }

    fn drop_session(&mut self, session_id: i32) {
        self.sessions.remove(&session_id);
        let gone_players: Vec<i32> = self
            .players
            .iter()
            .filter(|(_, (sid, _))| *sid == session_id)
            .map(|(id, _)| *id)
            .collect();
        for player_id in gone_players {
            self.drop_player(player_id);
        }
    }

    fn drop_player(&mut self, player_id: i32) {
        self.players.remove(&player_id);
        let gone_subs: Vec<i32> = self
            .submissions
            .iter()
            .filter(|(_, (pid, _))| *pid == player_id)
            .map(|(id, _)| *id)
            .collect();
        self.submissions.retain(|_, (pid, _)| *pid != player_id);
        self.words
            .retain(|_, (submission_id, _)| !gone_subs.contains(submission_id));
    }
}

impl SessionStore for MemStore {
    async fn create_session(&self, new: NewSession) -> Result<SessionRow, StoreError> {
        let mut db = self.0.lock().await;
        let id = db.fresh_id();
        let sess = SessionRow {
            id,
            created: Utc::now(),
            dice_config: new.dice_config,
            dictionary: new.dictionary,
            round_minutes: new.round_minutes,
            mild_scoring: new.mild_scoring,
            round_no: 0,
            round_start: None,
            round_scored: None,
        };
        db.sessions.insert(id, sess.clone());
        Ok(sess)
    }

    async fn load_session(&self, session_id: i32) -> Result<SessionRow, StoreError> {
        let db = self.0.lock().await;
        db.sessions
            .get(&session_id)
            .cloned()
            .ok_or(StoreError::SessionGone)
    }

    async fn destroy_session(&self, session_id: i32) -> Result<(), StoreError> {
        let mut db = self.0.lock().await;
        if !db.sessions.contains_key(&session_id) {
            return Err(StoreError::SessionGone);
        }
        db.drop_session(session_id);
        Ok(())
    }

    async fn advance_round(
        &self,
        session_id: i32,
        round_start: DateTime<Utc>,
    ) -> Result<SessionRow, StoreError> {
        let mut db = self.0.lock().await;
        let player_count = db.player_count(session_id);
        let sess = db
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionGone)?;
        check_advance(sess, player_count)?;
        sess.round_scored = None;
        sess.round_start = Some(round_start);
        sess.round_no += 1;
        Ok(sess.clone())
    }

    async fn add_player(&self, session_id: i32, name: String) -> Result<PlayerRow, StoreError> {
        let mut db = self.0.lock().await;
        if !db.sessions.contains_key(&session_id) {
            return Err(StoreError::SessionGone);
        }
        let id = db.fresh_id();
        db.players.insert(id, (session_id, name.clone()));
        Ok(PlayerRow { id, name })
    }

    async fn remove_player(&self, session_id: i32, player_id: i32) -> Result<(), StoreError> {
        let mut db = self.0.lock().await;
        let sess = db
            .sessions
            .get(&session_id)
            .ok_or(StoreError::SessionGone)?;
        if sess.round_scored == Some(false) {
            return Err(StoreError::MidScoring);
        }
        if !db
            .players
            .get(&player_id)
            .is_some_and(|(sid, _)| *sid == session_id)
        {
            return Err(StoreError::PlayerGone);
        }
        db.drop_player(player_id);
        Ok(())
    }

    async fn players(&self, session_id: i32) -> Result<Vec<PlayerRow>, StoreError> {
        let db = self.0.lock().await;
        Ok(db
            .players
            .iter()
            .filter(|(_, (sid, _))| *sid == session_id)
            .map(|(id, (_, name))| PlayerRow {
                id: *id,
                name: name.clone(),
            })
            .collect())
    }

    async fn submit(
        &self,
        session_id: i32,
        player_id: i32,
        round_no: i32,
        submitted: Vec<String>,
        now: DateTime<Utc>,
        grace_period: Duration,
    ) -> Result<(), StoreError> {
        let mut db = self.0.lock().await;
        let sess = db
            .sessions
            .get(&session_id)
            .ok_or(StoreError::SessionGone)?;
        if !db
            .players
            .get(&player_id)
            .is_some_and(|(sid, _)| *sid == session_id)
        {
            return Err(StoreError::PlayerGone);
        }
        check_submit(sess, round_no, now, grace_period)?;
        if db.submission_for(player_id, round_no).is_some() {
            return Err(StoreError::AlreadySubmitted);
        }
        let submission_id = db.fresh_id();
        db.submissions.insert(submission_id, (player_id, round_no));
        for word in submitted {
            let repeat = db
                .words
                .values()
                .any(|(sid, row)| *sid == submission_id && row.word == word);
            if repeat {
                continue;
            }
            let id = db.fresh_id();
            db.words.insert(
                id,
                (
                    submission_id,
                    WordRow {
                        id,
                        word,
                        score: None,
                        duplicate: None,
                        dictionary_valid: None,
                        path: None,
                    },
                ),
            );
        }
        Ok(())
    }

    async fn all_submitted(&self, session_id: i32, round_no: i32) -> Result<bool, StoreError> {
        let db = self.0.lock().await;
        let waiting = db
            .players
            .iter()
            .filter(|(_, (sid, _))| *sid == session_id)
            .any(|(player_id, _)| db.submission_for(*player_id, round_no).is_none());
        Ok(!waiting)
    }

    async fn claim_scoring(&self, session_id: i32) -> Result<Claim, StoreError> {
        let mut db = self.0.lock().await;
        let Some(sess) = db.sessions.get_mut(&session_id) else {
            return Ok(Claim::Gone);
        };
        Ok(match sess.round_scored {
            Some(false) => Claim::Busy,
            Some(true) => Claim::Done,
            None => {
                let snapshot = sess.clone();
                sess.round_scored = Some(false);
                Claim::Claimed(snapshot)
            }
        })
    }

    async fn round_words(
        &self,
        session_id: i32,
        round_no: i32,
    ) -> Result<Vec<PlayerWords>, StoreError> {
        let db = self.0.lock().await;
        let rows = db
            .owned_words(session_id, Some(round_no))
            .into_iter()
            .map(|(_, player, word)| (player, word))
            .collect();
        Ok(group_by_player(rows))
    }

    async fn commit_scores(
        &self,
        session_id: i32,
        updates: Vec<WordUpdate>,
    ) -> Result<(), StoreError> {
        let mut db = self.0.lock().await;
        if !db.sessions.contains_key(&session_id) {
            return Err(StoreError::SessionGone);
        }
        for update in updates {
            if let Some((_, row)) = db.words.get_mut(&update.id) {
                row.score = Some(update.score);
                row.duplicate = Some(update.duplicate);
                row.dictionary_valid = Some(update.dictionary_valid);
                row.path = update.path;
            }
        }
        if let Some(sess) = db.sessions.get_mut(&session_id) {
            sess.round_scored = Some(true);
        }
        Ok(())
    }

    async fn approve_words(
        &self,
        session_id: i32,
        round_no: i32,
        approved: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut db = self.0.lock().await;
        let targets: Vec<i32> = db
            .owned_words(session_id, Some(round_no))
            .into_iter()
            .filter(|(_, _, word)| approved.contains(&word.word))
            .map(|(_, _, word)| word.id)
            .collect();
        for id in targets {
            if let Some((_, row)) = db.words.get_mut(&id) {
                row.dictionary_valid = Some(true);
            }
        }
        Ok(())
    }

    async fn session_words(&self, session_id: i32) -> Result<Vec<SessionWord>, StoreError> {
        let db = self.0.lock().await;
        Ok(db
            .owned_words(session_id, None)
            .into_iter()
            .map(|(round_no, player, word)| SessionWord {
                round_no,
                player,
                word,
            })
            .collect())
    }
}
