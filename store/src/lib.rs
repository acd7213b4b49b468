// ═══════════════════════════════════════════════════════════════════════
// Store — SQLite implementation of the engine's persistence/notification
// backend: users, game snapshots, per-player views and notification rows.
// ═══════════════════════════════════════════════════════════════════════

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::Mutex;
use throne_engine::errors::BackendError;
use throne_engine::session::Backend;
use throne_engine::{Player, User, UserId};

fn db_err(e: rusqlite::Error) -> BackendError {
    BackendError::Storage(e.to_string())
}

/// SQLite-backed [`Backend`]. The connection is serialized behind a mutex
/// so many sessions can share one store.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a store at the given path.
    pub fn new(path: &str) -> Result<Self, BackendError> {
        let conn = Connection::open(path).map_err(db_err)?;
        let backend = SqliteBackend {
            conn: Mutex::new(conn),
        };
        backend.create_schema()?;
        Ok(backend)
    }

    /// In-memory store (useful for tests).
    pub fn in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let backend = SqliteBackend {
            conn: Mutex::new(conn),
        };
        backend.create_schema()?;
        Ok(backend)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, BackendError> {
        self.conn
            .lock()
            .map_err(|_| BackendError::Storage("connection mutex poisoned".to_string()))
    }

    fn create_schema(&self) -> Result<(), BackendError> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS games (
                id          TEXT PRIMARY KEY,
                serialized  TEXT NOT NULL,
                state       TEXT NOT NULL,
                version     TEXT NOT NULL,
                saved_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS game_views (
                game_id     TEXT NOT NULL REFERENCES games(id),
                user_id     TEXT NOT NULL,
                view        TEXT NOT NULL,
                PRIMARY KEY (game_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS game_players (
                game_id     TEXT NOT NULL REFERENCES games(id),
                user_id     TEXT NOT NULL,
                house       TEXT NOT NULL,
                PRIMARY KEY (game_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id          INTEGER PRIMARY KEY,
                kind        TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS chat_rooms (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE
            );
        ",
            )
            .map_err(db_err)
    }

    /// Insert or update a user record.
    pub fn upsert_user(&self, user: &User) -> Result<(), BackendError> {
        self.lock()?
            .execute(
                "INSERT INTO users (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![user.id.to_string(), user.name],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Notification kinds recorded for a user, oldest first.
    pub fn notifications_for(&self, user: &UserId) -> Result<Vec<String>, BackendError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT kind FROM notifications WHERE user_id = ?1 ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user.to_string()], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        let mut kinds = Vec::new();
        for row in rows {
            kinds.push(row.map_err(db_err)?);
        }
        Ok(kinds)
    }

    fn record_notifications(&self, kind: &str, users: &[UserId]) -> Result<(), BackendError> {
        let conn = self.lock()?;
        for user in users {
            conn.execute(
                "INSERT INTO notifications (kind, user_id) VALUES (?1, ?2)",
                params![kind, user.to_string()],
            )
            .map_err(db_err)?;
        }
        log::debug!("recorded {kind} notification for {} users", users.len());
        Ok(())
    }
}

impl Backend for SqliteBackend {
    fn get_user(&self, id: &UserId) -> Result<Option<User>, BackendError> {
        self.lock()?
            .query_row(
                "SELECT id, name FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(User {
                        id: UserId(row.get(0)?),
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    fn get_game(&self, id: &str) -> Result<Option<serde_json::Value>, BackendError> {
        let serialized: Option<String> = self
            .lock()?
            .query_row(
                "SELECT serialized FROM games WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match serialized {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn save_game(
        &self,
        id: &str,
        serialized_game: &serde_json::Value,
        view_for_each_player: &BTreeMap<UserId, serde_json::Value>,
        players: &[Player],
        state: &str,
        version: &str,
    ) -> Result<(), BackendError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO games (id, serialized, state, version) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 serialized = excluded.serialized,
                 state = excluded.state,
                 version = excluded.version,
                 saved_at = datetime('now')",
            params![id, serialized_game.to_string(), state, version],
        )
        .map_err(db_err)?;

        tx.execute("DELETE FROM game_views WHERE game_id = ?1", params![id])
            .map_err(db_err)?;
        for (user, view) in view_for_each_player {
            tx.execute(
                "INSERT INTO game_views (game_id, user_id, view) VALUES (?1, ?2, ?3)",
                params![id, user.to_string(), view.to_string()],
            )
            .map_err(db_err)?;
        }

        tx.execute("DELETE FROM game_players WHERE game_id = ?1", params![id])
            .map_err(db_err)?;
        for player in players {
            tx.execute(
                "INSERT INTO game_players (game_id, user_id, house) VALUES (?1, ?2, ?3)",
                params![id, player.user.to_string(), player.house.to_string()],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        log::debug!("saved game {id} ({state}, {} views)", view_for_each_player.len());
        Ok(())
    }

    fn notify_ready_to_start(&self, users: &[UserId]) -> Result<(), BackendError> {
        self.record_notifications("ready-to-start", users)
    }

    fn notify_your_turn(&self, users: &[UserId]) -> Result<(), BackendError> {
        self.record_notifications("your-turn", users)
    }

    fn notify_battle_results(&self, users: &[UserId]) -> Result<(), BackendError> {
        self.record_notifications("battle-results", users)
    }

    fn notify_new_vote(&self, users: &[UserId]) -> Result<(), BackendError> {
        self.record_notifications("new-vote", users)
    }

    fn notify_game_ended(&self, users: &[UserId]) -> Result<(), BackendError> {
        self.record_notifications("game-ended", users)
    }

    fn create_chat_room(&self, name: &str) -> Result<String, BackendError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO chat_rooms (name) VALUES (?1)",
            params![name],
        )
        .map_err(db_err)?;
        let id: i64 = conn
            .query_row(
                "SELECT id FROM chat_rooms WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(format!("chat-{id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use throne_engine::session::Session;
    use throne_engine::setup::demo_session;

    #[test]
    fn test_user_round_trip() {
        let backend = SqliteBackend::in_memory().unwrap();
        let user = User {
            id: UserId::from("u1"),
            name: "Alice".to_string(),
        };
        backend.upsert_user(&user).unwrap();
        let found = backend.get_user(&UserId::from("u1")).unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.name, "Alice");
        assert!(backend.get_user(&UserId::from("nobody")).unwrap().is_none());
    }

    #[test]
    fn test_session_snapshot_round_trip() {
        let backend = SqliteBackend::in_memory().unwrap();
        let (session, _) = demo_session();
        session.save_to(&backend).unwrap();

        let snapshot = backend.get_game("demo").unwrap().unwrap();
        let restored = Session::restore("demo", session.users.clone(), snapshot).unwrap();
        assert_eq!(
            restored.ingame.serialize_to_client(true, None).unwrap(),
            session.ingame.serialize_to_client(true, None).unwrap()
        );
    }

    #[test]
    fn test_save_is_an_upsert() {
        let backend = SqliteBackend::in_memory().unwrap();
        let (session, _) = demo_session();
        session.save_to(&backend).unwrap();
        session.save_to(&backend).unwrap();
        let conn = backend.conn.lock().unwrap();
        let games: i64 = conn
            .query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))
            .unwrap();
        let views: i64 = conn
            .query_row("SELECT COUNT(*) FROM game_views", [], |row| row.get(0))
            .unwrap();
        assert_eq!(games, 1);
        assert_eq!(views, 3);
    }

    #[test]
    fn test_notifications_recorded_per_user() {
        let backend = SqliteBackend::in_memory().unwrap();
        let (_, events) = demo_session();
        Session::dispatch_notifications(&backend, events).unwrap();
        let kinds = backend.notifications_for(&UserId::from("u1")).unwrap();
        assert_eq!(kinds, vec!["ready-to-start", "your-turn"]);
    }

    #[test]
    fn test_chat_room_handle_is_stable() {
        let backend = SqliteBackend::in_memory().unwrap();
        let a = backend.create_chat_room("demo").unwrap();
        let b = backend.create_chat_room("demo").unwrap();
        assert_eq!(a, b);
    }
}
