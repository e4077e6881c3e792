use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use super::{
    Claim, NewSession, PlayerRow, PlayerWords, SessionRow, SessionStore, SessionWord, StoreError,
    WordRow, WordUpdate, check_advance, check_submit, group_by_player,
};

const SCHEMA: &str = include_str!("schema.sql");

/// Create tables as necessary and truncate all sessions, cascading; the
/// state machine relies on wall-clock and in-flight worker state, both of
/// which a restart invalidates.
pub(crate) async fn init(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await.map(|_| ())
}

#[derive(Clone)]
pub(crate) struct PgStore(pub(crate) PgPool);

impl PgStore {
    async fn lock_session(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        session_id: i32,
    ) -> Result<Option<SessionRow>, StoreError> {
        let sess = sqlx::query_as::<_, SessionRow>(
            "select * from boggle_session where id = $1 for update",
        )
        .bind(session_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(sess)
    }
}

impl SessionStore for PgStore {
    async fn create_session(&self, new: NewSession) -> Result<SessionRow, StoreError> {
        let sess = sqlx::query_as::<_, SessionRow>(
            "insert into boggle_session (dice_config, dictionary, round_minutes, mild_scoring)
             values ($1, $2, $3, $4)
             returning *",
        )
        .bind(new.dice_config)
        .bind(new.dictionary)
        .bind(new.round_minutes)
        .bind(new.mild_scoring)
        .fetch_one(&self.0)
        .await?;
        Ok(sess)
    }

    async fn load_session(&self, session_id: i32) -> Result<SessionRow, StoreError> {
        sqlx::query_as::<_, SessionRow>("select * from boggle_session where id = $1")
            .bind(session_id)
            .fetch_optional(&self.0)
            .await?
            .ok_or(StoreError::SessionGone)
    }

    async fn destroy_session(&self, session_id: i32) -> Result<(), StoreError> {
        let result = sqlx::query("delete from boggle_session where id = $1")
            .bind(session_id)
            .execute(&self.0)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::SessionGone);
        }
        Ok(())
    }

    async fn advance_round(
        &self,
        session_id: i32,
        round_start: DateTime<Utc>,
    ) -> Result<SessionRow, StoreError> {
        let mut tx = self.0.begin().await?;
        let sess = Self::lock_session(&mut tx, session_id)
            .await?
            .ok_or(StoreError::SessionGone)?;
        let player_count: i64 =
            sqlx::query_scalar("select count(*) from player where session_id = $1")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;
        check_advance(&sess, player_count)?;
        let sess = sqlx::query_as::<_, SessionRow>(
            "update boggle_session
             set round_scored = null, round_start = $2, round_no = round_no + 1
             where id = $1
             returning *",
        )
        .bind(session_id)
        .bind(round_start)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(sess)
    }

    async fn add_player(&self, session_id: i32, name: String) -> Result<PlayerRow, StoreError> {
        let exists: bool =
            sqlx::query_scalar("select exists (select 1 from boggle_session where id = $1)")
                .bind(session_id)
                .fetch_one(&self.0)
                .await?;
        if !exists {
            return Err(StoreError::SessionGone);
        }
        let player = sqlx::query_as::<_, PlayerRow>(
            "insert into player (session_id, name) values ($1, $2) returning id, name",
        )
        .bind(session_id)
        .bind(name)
        .fetch_one(&self.0)
        .await?;
        Ok(player)
    }

    async fn remove_player(&self, session_id: i32, player_id: i32) -> Result<(), StoreError> {
        let mut tx = self.0.begin().await?;
        let sess = Self::lock_session(&mut tx, session_id)
            .await?
            .ok_or(StoreError::SessionGone)?;
        if sess.round_scored == Some(false) {
            return Err(StoreError::MidScoring);
        }
        let result = sqlx::query("delete from player where id = $1 and session_id = $2")
            .bind(player_id)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PlayerGone);
        }
        tx.commit().await?;
        Ok(())
    }

    async fn players(&self, session_id: i32) -> Result<Vec<PlayerRow>, StoreError> {
        let players = sqlx::query_as::<_, PlayerRow>(
            "select id, name from player where session_id = $1 order by id",
        )
        .bind(session_id)
        .fetch_all(&self.0)
        .await?;
        Ok(players)
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
        let mut tx = self.0.begin().await?;
        let sess = Self::lock_session(&mut tx, session_id)
            .await?
            .ok_or(StoreError::SessionGone)?;
        let player_exists: bool = sqlx::query_scalar(
            "select exists (select 1 from player where id = $1 and session_id = $2)",
        )
        .bind(player_id)
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;
        if !player_exists {
            return Err(StoreError::PlayerGone);
        }
        check_submit(&sess, round_no, now, grace_period)?;

        let inserted = sqlx::query_scalar::<_, i32>(
            "insert into submission (player_id, round_no) values ($1, $2) returning id",
        )
        .bind(player_id)
        .bind(round_no)
        .fetch_one(&mut *tx)
        .await;
        let submission_id = match inserted {
            Ok(id) => id,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StoreError::AlreadySubmitted);
            }
            Err(e) => return Err(e.into()),
        };

        if !submitted.is_empty() {
            let mut builder = sqlx::QueryBuilder::new("insert into word (submission_id, word) ");
            builder.push_values(submitted, |mut b, word| {
                b.push_bind(submission_id).push_bind(word);
            });
            builder.push("on conflict do nothing");
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn all_submitted(&self, session_id: i32, round_no: i32) -> Result<bool, StoreError> {
        // is there a player in the session without a submission this round?
        let all_in: bool = sqlx::query_scalar(
            "select not exists (
                 select 1 from player p
                 where p.session_id = $1
                 and not exists (
                     select 1 from submission s
                     where s.player_id = p.id and s.round_no = $2
                 )
             )",
        )
        .bind(session_id)
        .bind(round_no)
        .fetch_one(&self.0)
        .await?;
        Ok(all_in)
    }

    async fn claim_scoring(&self, session_id: i32) -> Result<Claim, StoreError> {
        let mut tx = self.0.begin().await?;
        let Some(sess) = Self::lock_session(&mut tx, session_id).await? else {
            return Ok(Claim::Gone);
        };
        let claim = match sess.round_scored {
            Some(false) => Claim::Busy,
            Some(true) => Claim::Done,
            None => {
                sqlx::query("update boggle_session set round_scored = false where id = $1")
                    .bind(session_id)
                    .execute(&mut *tx)
                    .await?;
                Claim::Claimed(sess)
            }
        };
        // commit releases the row lock and publishes the in-progress state
        tx.commit().await?;
        Ok(claim)
    }

    async fn round_words(
        &self,
        session_id: i32,
        round_no: i32,
    ) -> Result<Vec<PlayerWords>, StoreError> {
        let rows = sqlx::query_as::<_, OwnedWord>(
            "select p.id as player_id, p.name, w.id, w.word,
                    w.score, w.duplicate, w.dictionary_valid, w.path,
                    s.round_no
             from word w
             join submission s on w.submission_id = s.id
             join player p on s.player_id = p.id
             where p.session_id = $1 and s.round_no = $2
             order by p.id, w.word",
        )
        .bind(session_id)
        .bind(round_no)
        .fetch_all(&self.0)
        .await?;
        Ok(group_by_player(
            rows.into_iter().map(OwnedWord::into_pair).collect(),
        ))
    }

    async fn commit_scores(
        &self,
        session_id: i32,
        updates: Vec<WordUpdate>,
    ) -> Result<(), StoreError> {
        let mut tx = self.0.begin().await?;
        Self::lock_session(&mut tx, session_id)
            .await?
            .ok_or(StoreError::SessionGone)?;
        for update in updates {
            sqlx::query(
                "update word
                 set score = $2, duplicate = $3, dictionary_valid = $4, path = $5
                 where id = $1",
            )
            .bind(update.id)
            .bind(update.score)
            .bind(update.duplicate)
            .bind(update.dictionary_valid)
            .bind(update.path)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("update boggle_session set round_scored = true where id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn approve_words(
        &self,
        session_id: i32,
        round_no: i32,
        approved: Vec<String>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "update word
             set dictionary_valid = true
             from submission s
             join player p on s.player_id = p.id
             where word.submission_id = s.id
             and p.session_id = $1 and s.round_no = $2
             and word.word = any($3)",
        )
        .bind(session_id)
        .bind(round_no)
        .bind(approved)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    async fn session_words(&self, session_id: i32) -> Result<Vec<SessionWord>, StoreError> {
        let rows = sqlx::query_as::<_, OwnedWord>(
            "select p.id as player_id, p.name, w.id, w.word,
                    w.score, w.duplicate, w.dictionary_valid, w.path,
                    s.round_no
             from word w
             join submission s on w.submission_id = s.id
             join player p on s.player_id = p.id
             where p.session_id = $1
             order by s.round_no, p.id, w.word",
        )
        .bind(session_id)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(OwnedWord::into_session_word).collect())
    }
}

/// Flattened join row of a word with its owner.
#[derive(sqlx::FromRow)]
struct OwnedWord {
    player_id: i32,
    name: String,
    id: i32,
    word: String,
    score: Option<i32>,
    duplicate: Option<bool>,
    dictionary_valid: Option<bool>,
    path: Option<String>,
    round_no: i32,
}

impl OwnedWord {
    fn into_pair(self) -> (PlayerRow, WordRow) {
        let OwnedWord {
            player_id,
            name,
            id,
            word,
            score,
            duplicate,
            dictionary_valid,
            path,
            ..
        } = self;
        (
            PlayerRow {
                id: player_id,
                name,
            },
            WordRow {
                id,
                word,
                score,
                duplicate,
                dictionary_valid,
                path,
            },
        )
    }

    fn into_session_word(self) -> SessionWord {
        let round_no = self.round_no;
        let (player, word) = self.into_pair();
        SessionWord {
            round_no,
            player,
            word,
        }
    }
}
