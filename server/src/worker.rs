use std::sync::Arc;

use game_config::{DiceConfigs, Dictionaries};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use words::BoggleWord;

use crate::app::AppState;
use crate::store::{Claim, SessionStore, StoreError, WordUpdate};

/// The scoring job contract. The seed travels with the job so the worker
/// reconstructs exactly the board the players saw, on any instance sharing
/// the database and dictionary directory.
#[derive(Debug, Clone)]
pub(crate) struct ScoreJob {
    pub(crate) session_id: i32,
    pub(crate) round_no: i32,
    pub(crate) seed: [u8; 32],
    pub(crate) dice_config: String,
}

#[derive(Clone)]
pub(crate) enum Dispatcher {
    /// Hand jobs to the background worker.
    Queue(mpsc::UnboundedSender<ScoreJob>),
    /// Score on the calling task before returning; used in tests.
    Inline,
}

pub(crate) fn queue() -> (Dispatcher, mpsc::UnboundedReceiver<ScoreJob>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Dispatcher::Queue(tx), rx)
}

pub(crate) async fn dispatch<S: SessionStore>(state: &AppState<S>, job: ScoreJob) {
    let (session_id, round_no) = (job.session_id, job.round_no);
    match &state.dispatcher {
        Dispatcher::Queue(tx) => {
            if tx.send(job).is_err() {
                error!(session_id, round_no, "scoring queue is closed, dropping job");
            }
        }
        Dispatcher::Inline => {
            if let Err(e) = run(&state.store, &state.dice, &state.dictionaries, job).await {
                error!(session_id, round_no, error = %e, "scoring failed");
            }
        }
    }
}

pub(crate) fn spawn<S: SessionStore>(
    mut rx: mpsc::UnboundedReceiver<ScoreJob>,
    store: S,
    dice: Arc<DiceConfigs>,
    dictionaries: Arc<Dictionaries>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let (session_id, round_no) = (job.session_id, job.round_no);
            if let Err(e) = run(&store, &dice, &dictionaries, job).await {
                // the claim marker stays at "in progress"; see DESIGN.md on
                // worker crash recovery
                error!(session_id, round_no, error = %e, "scoring failed");
            }
        }
    })
}

/// Score one round. Idempotent: the locked claim of `round_scored` ensures
/// at most one invocation gets past step one per round, and reruns after
/// completion are no-ops.
pub(crate) async fn run<S: SessionStore>(
    store: &S,
    dice: &DiceConfigs,
    dictionaries: &Dictionaries,
    job: ScoreJob,
) -> Result<(), StoreError> {
    let sess = match store.claim_scoring(job.session_id).await? {
        Claim::Claimed(sess) => sess,
        Claim::Busy | Claim::Done | Claim::Gone => return Ok(()),
    };

    let players = store.round_words(job.session_id, job.round_no).await?;
    if players.is_empty() {
        // nobody submitted anything; the round is trivially scored
        return finish(store, job.session_id, Vec::new()).await;
    }

    let Some(die_set) = dice.get(&job.dice_config) else {
        error!(config = %job.dice_config, "dice config disappeared, leaving round unscored");
        return Ok(());
    };
    let grid = match board::roll(job.seed, &die_set, None) {
        Ok(grid) => grid,
        Err(e) => {
            error!(config = %job.dice_config, error = %e, "cannot reroll board, leaving round unscored");
            return Ok(());
        }
    };

    let dictionary = match &sess.dictionary {
        None => None,
        Some(name) => match dictionaries.load(name) {
            Ok(dict) => Some(dict),
            Err(e) => {
                warn!(error = %e, "dictionary unavailable, scoring without it");
                None
            }
        },
    };

    let word_lists: Vec<Vec<BoggleWord>> = players
        .iter()
        .map(|group| {
            group
                .words
                .iter()
                .map(|row| BoggleWord::new(&row.word))
                .collect()
        })
        .collect();
    let scored = scoring::score_round(word_lists, &grid, dictionary.as_deref());

    let updates: Vec<WordUpdate> = players
        .iter()
        .zip(&scored)
        .flat_map(|(group, results)| {
            group.words.iter().zip(results).map(|(row, result)| WordUpdate {
                id: row.id,
                score: result.score,
                duplicate: result.duplicate,
                dictionary_valid: result.dictionary_valid,
                path: result
                    .path
                    .as_ref()
                    .and_then(|p| serde_json::to_string(p).ok()),
            })
        })
        .collect();
    info!(
        session_id = job.session_id,
        round_no = job.round_no,
        words = updates.len(),
        "scored round"
    );
    finish(store, job.session_id, updates).await
}

async fn finish<S: SessionStore>(
    store: &S,
    session_id: i32,
    updates: Vec<WordUpdate>,
) -> Result<(), StoreError> {
    match store.commit_scores(session_id, updates).await {
        // the session was destroyed while we were computing
        Err(StoreError::SessionGone) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::MemStore;
    use crate::store::NewSession;
    use chrono::{Duration, Utc};

    fn mono_dice() -> DiceConfigs {
        DiceConfigs::from_entries([("Mono".to_owned(), vec![vec!['A']; 9])])
    }

    async fn scored_session(store: &MemStore) -> (i32, ScoreJob) {
        let sess = store
            .create_session(NewSession {
                dice_config: "Mono".to_owned(),
                dictionary: None,
                round_minutes: 3,
                mild_scoring: false,
            })
            .await
            .unwrap();
        let player = store.add_player(sess.id, "tester".to_owned()).await.unwrap();
        store.advance_round(sess.id, Utc::now()).await.unwrap();
        store
            .submit(
                sess.id,
                player.id,
                1,
                vec!["AAA".to_owned(), "AAAAA".to_owned(), "BCD".to_owned()],
                Utc::now(),
                Duration::seconds(10),
            )
            .await
            .unwrap();
        let job = ScoreJob {
            session_id: sess.id,
            round_no: 1,
            seed: [5; 32],
            dice_config: "Mono".to_owned(),
        };
        (sess.id, job)
    }

    #[tokio::test]
    async fn worker_scores_and_is_idempotent() {
        let store = MemStore::default();
        let dice = mono_dice();
        let dicts = Dictionaries::from_entries(Vec::<(String, Vec<String>)>::new());
        let (session_id, job) = scored_session(&store).await;

        run(&store, &dice, &dicts, job.clone()).await.unwrap();
        let sess = store.load_session(session_id).await.unwrap();
        assert_eq!(sess.round_scored, Some(true));

        let snapshot = |groups: Vec<crate::store::PlayerWords>| {
            groups
                .into_iter()
                .flat_map(|g| g.words)
                .map(|w| (w.word, w.score, w.duplicate, w.dictionary_valid, w.path))
                .collect::<Vec<_>>()
        };
        let first = snapshot(store.round_words(session_id, 1).await.unwrap());
        assert_eq!(first.len(), 3);
        let aaa = first.iter().find(|w| w.0 == "AAA").unwrap();
        assert_eq!(aaa.1, Some(1));
        assert!(aaa.4.is_some());
        let bcd = first.iter().find(|w| w.0 == "BCD").unwrap();
        assert_eq!(bcd.1, Some(0));
        assert!(bcd.4.is_none());

        // rerunning the job must not change the terminal rows
        run(&store, &dice, &dicts, job).await.unwrap();
        let second = snapshot(store.round_words(session_id, 1).await.unwrap());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_round_is_marked_scored() {
        let store = MemStore::default();
        let dice = mono_dice();
        let dicts = Dictionaries::from_entries(Vec::<(String, Vec<String>)>::new());
        let sess = store
            .create_session(NewSession {
                dice_config: "Mono".to_owned(),
                dictionary: None,
                round_minutes: 3,
                mild_scoring: false,
            })
            .await
            .unwrap();
        store.add_player(sess.id, "tester".to_owned()).await.unwrap();
        store.advance_round(sess.id, Utc::now()).await.unwrap();

        run(
            &store,
            &dice,
            &dicts,
            ScoreJob {
                session_id: sess.id,
                round_no: 1,
                seed: [5; 32],
                dice_config: "Mono".to_owned(),
            },
        )
        .await
        .unwrap();
        let sess = store.load_session(sess.id).await.unwrap();
        assert_eq!(sess.round_scored, Some(true));
    }

    #[tokio::test]
    async fn claimed_round_blocks_advance_and_leave() {
        let store = MemStore::default();
        let (session_id, _) = scored_session(&store).await;
        let claim = store.claim_scoring(session_id).await.unwrap();
        assert!(matches!(claim, Claim::Claimed(_)));

        // round_scored is now false: the state machine rejects transitions
        let err = store.advance_round(session_id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::MidScoring));
        let players = store.players(session_id).await.unwrap();
        let err = store
            .remove_player(session_id, players[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MidScoring));

        // and a second claim backs off
        assert!(matches!(
            store.claim_scoring(session_id).await.unwrap(),
            Claim::Busy
        ));
    }

    #[tokio::test]
    async fn broken_board_leaves_the_claim_in_place() {
        let store = MemStore::default();
        let dice = mono_dice();
        let dicts = Dictionaries::from_entries(Vec::<(String, Vec<String>)>::new());
        let (session_id, mut job) = scored_session(&store).await;
        job.dice_config = "NoSuchSet".to_owned();

        run(&store, &dice, &dicts, job).await.unwrap();
        // the known stuck state: in progress forever, documented deficiency
        let sess = store.load_session(session_id).await.unwrap();
        assert_eq!(sess.round_scored, Some(false));
    }

    #[tokio::test]
    async fn destroyed_session_is_not_an_error() {
        let store = MemStore::default();
        let dice = mono_dice();
        let dicts = Dictionaries::from_entries(Vec::<(String, Vec<String>)>::new());
        let (session_id, _) = scored_session(&store).await;
        let claim = store.claim_scoring(session_id).await.unwrap();
        assert!(matches!(claim, Claim::Claimed(_)));
        store.destroy_session(session_id).await.unwrap();

        // the worker notices the session vanished and exits quietly
        assert!(matches!(
            store.claim_scoring(session_id).await.unwrap(),
            Claim::Gone
        ));
        assert!(finish(&store, session_id, Vec::new()).await.is_ok());
    }
}
