use super::state::ConversationState;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// One user/assistant exchange plus the tone state it left behind.
/// Append-only per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: String,
    pub seq: u64,
    pub user_text: String,
    pub assistant_text: String,
    pub created_at: DateTime<Utc>,
    pub state: ConversationState,
}

/// Per-turn tone samples for the dashboard boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSeries {
    pub patience: Vec<f64>,
    pub snark: Vec<f64>,
}

/// SQLite-backed turn ledger, keyed by (session id, sequence number).
/// Rows are immutable once written.
pub struct TurnStore {
    conn: Mutex<Connection>,
}

impl TurnStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// In-memory store for tests and ephemeral sessions.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS turns (
                 session_id TEXT NOT NULL,
                 seq INTEGER NOT NULL,
                 user_text TEXT NOT NULL,
                 assistant_text TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 patience REAL NOT NULL,
                 snark REAL NOT NULL,
                 topic_score REAL NOT NULL,
                 off_topic_count INTEGER NOT NULL,
                 strict INTEGER NOT NULL,
                 corrective INTEGER NOT NULL,
                 PRIMARY KEY (session_id, seq)
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn append_turn(
        &self,
        user_text: &str,
        assistant_text: &str,
        state: &ConversationState,
    ) -> Result<ConversationTurn, StoreError> {
        let conn = self.lock_connection()?;
        let next_seq: u64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM turns WHERE session_id = ?1",
            params![state.session_id],
            |row| row.get(0),
        )?;
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO turns (session_id, seq, user_text, assistant_text, created_at,
                                patience, snark, topic_score, off_topic_count, strict, corrective)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                state.session_id,
                next_seq,
                user_text,
                assistant_text,
                created_at.to_rfc3339(),
                state.patience,
                state.snark,
                state.topic_match_score,
                state.consecutive_off_topic,
                state.strict_enforcement,
                state.corrective,
            ],
        )?;

        Ok(ConversationTurn {
            session_id: state.session_id.clone(),
            seq: next_seq,
            user_text: user_text.to_string(),
            assistant_text: assistant_text.to_string(),
            created_at,
            state: state.clone(),
        })
    }

    /// Turns in chronological order. `limit` keeps the most recent N.
    pub fn turns(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let conn = self.lock_connection()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, seq, user_text, assistant_text, created_at,
                    patience, snark, topic_score, off_topic_count, strict, corrective
             FROM turns WHERE session_id = ?1 ORDER BY seq",
        )?;
        let mut rows: Vec<ConversationTurn> = stmt
            .query_map(params![session_id], Self::map_turn_row)?
            .collect::<Result<_, _>>()?;
        if let Some(limit) = limit
            && rows.len() > limit
        {
            rows.drain(..rows.len() - limit);
        }
        Ok(rows)
    }

    /// One (patience, snark) sample per turn, in turn order.
    pub fn state_series(&self, session_id: &str) -> Result<StateSeries, StoreError> {
        let conn = self.lock_connection()?;
        let mut stmt = conn.prepare(
            "SELECT patience, snark FROM turns WHERE session_id = ?1 ORDER BY seq",
        )?;
        let mut series = StateSeries::default();
        let samples = stmt.query_map(params![session_id], |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?))
        })?;
        for sample in samples {
            let (patience, snark) = sample?;
            series.patience.push(patience);
            series.snark.push(snark);
        }
        Ok(series)
    }

    fn map_turn_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationTurn> {
        let session_id: String = row.get(0)?;
        let created_raw: String = row.get(4)?;
        let created_at = DateTime::parse_from_rfc3339(&created_raw)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);

        Ok(ConversationTurn {
            session_id: session_id.clone(),
            seq: row.get(1)?,
            user_text: row.get(2)?,
            assistant_text: row.get(3)?,
            created_at,
            state: ConversationState {
                session_id,
                patience: row.get(5)?,
                snark: row.get(6)?,
                topic_match_score: row.get(7)?,
                consecutive_off_topic: row.get(8)?,
                strict_enforcement: row.get(9)?,
                corrective: row.get(10)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(session_id: &str, patience: f64, snark: f64) -> ConversationState {
        ConversationState {
            patience,
            snark,
            ..ConversationState::new(session_id, false)
        }
    }

    #[test]
    fn sequence_numbers_start_at_one_and_increase() {
        let store = TurnStore::open_in_memory().unwrap();
        let s = state("s1", 1.0, 0.0);

        let t1 = store.append_turn("hi", "hello", &s).unwrap();
        let t2 = store.append_turn("more", "sure", &s).unwrap();

        assert_eq!(t1.seq, 1);
        assert_eq!(t2.seq, 2);
    }

    #[test]
    fn sessions_are_isolated() {
        let store = TurnStore::open_in_memory().unwrap();
        store.append_turn("a", "b", &state("one", 1.0, 0.0)).unwrap();
        store.append_turn("c", "d", &state("two", 1.0, 0.0)).unwrap();

        assert_eq!(store.turns("one", None).unwrap().len(), 1);
        assert_eq!(store.turns("two", None).unwrap().len(), 1);
        assert_eq!(store.turns("one", None).unwrap()[0].user_text, "a");
    }

    #[test]
    fn limit_keeps_most_recent_turns() {
        let store = TurnStore::open_in_memory().unwrap();
        let s = state("s1", 1.0, 0.0);
        for i in 0..5 {
            store.append_turn(&format!("msg {i}"), "ok", &s).unwrap();
        }

        let recent = store.turns("s1", Some(2)).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user_text, "msg 3");
        assert_eq!(recent[1].user_text, "msg 4");
    }

    #[test]
    fn state_series_samples_once_per_turn() {
        let store = TurnStore::open_in_memory().unwrap();
        store.append_turn("a", "b", &state("s1", 1.0, 0.0)).unwrap();
        store.append_turn("c", "d", &state("s1", 0.7, 0.0)).unwrap();
        store.append_turn("e", "f", &state("s1", 0.4, 0.25)).unwrap();

        let series = store.state_series("s1").unwrap();
        assert_eq!(series.patience, vec![1.0, 0.7, 0.4]);
        assert_eq!(series.snark, vec![0.0, 0.0, 0.25]);
    }

    #[test]
    fn snapshot_roundtrips_through_sqlite() {
        let store = TurnStore::open_in_memory().unwrap();
        let mut s = ConversationState::new("s1", true);
        s.patience = 0.35;
        s.topic_match_score = 12.5;
        s.consecutive_off_topic = 2;
        s.corrective = true;

        store.append_turn("u", "a", &s).unwrap();
        let back = &store.turns("s1", None).unwrap()[0].state;

        assert_eq!(back.patience, 0.35);
        assert_eq!(back.topic_match_score, 12.5);
        assert_eq!(back.consecutive_off_topic, 2);
        assert!(back.strict_enforcement);
        assert!(back.corrective);
    }
}
