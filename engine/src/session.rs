// ═══════════════════════════════════════════════════════════════════════
// Session — one game instance wrapping the ingame tree, plus the Backend
// trait for the external persistence/notification collaborator.
//
// The session routes inbound messages, collects the outbound event list,
// and snapshots itself through the backend. It owns no delivery logic:
// broadcasts and notifications are returned to the caller, which decides
// how they reach clients.
// ═══════════════════════════════════════════════════════════════════════

use crate::errors::{BackendError, Rejection};
use crate::ingame::IngameState;
use crate::messages::{ClientMessage, Notification, Outbound, Outbox, ServerMessage};
use crate::types::*;
use std::collections::BTreeMap;

/// External persistence/notification collaborator. Implementations must be
/// safe to call concurrently from many sessions.
pub trait Backend: Send + Sync {
    fn get_user(&self, id: &UserId) -> Result<Option<User>, BackendError>;
    fn get_game(&self, id: &str) -> Result<Option<serde_json::Value>, BackendError>;
    #[allow(clippy::too_many_arguments)]
    fn save_game(
        &self,
        id: &str,
        serialized_game: &serde_json::Value,
        view_for_each_player: &BTreeMap<UserId, serde_json::Value>,
        players: &[Player],
        state: &str,
        version: &str,
    ) -> Result<(), BackendError>;
    fn notify_ready_to_start(&self, users: &[UserId]) -> Result<(), BackendError>;
    fn notify_your_turn(&self, users: &[UserId]) -> Result<(), BackendError>;
    fn notify_battle_results(&self, users: &[UserId]) -> Result<(), BackendError>;
    fn notify_new_vote(&self, users: &[UserId]) -> Result<(), BackendError>;
    fn notify_game_ended(&self, users: &[UserId]) -> Result<(), BackendError>;
    /// Provision a chat room for the session; returns its handle.
    fn create_chat_room(&self, name: &str) -> Result<String, BackendError>;
}

pub struct Session {
    pub id: String,
    pub users: BTreeMap<UserId, User>,
    pub ingame: IngameState,
}

impl Session {
    /// Build a fresh session: each seat binds one user to one house. The
    /// returned events carry the entry effects of the first turn.
    pub fn new(
        id: &str,
        seats: Vec<(User, HouseName)>,
        game: crate::game::Game,
    ) -> (Self, Vec<Outbound>) {
        let mut users = BTreeMap::new();
        let mut players = BTreeMap::new();
        for (user, house) in seats {
            players.insert(
                user.id.clone(),
                Player {
                    user: user.id.clone(),
                    house,
                },
            );
            users.insert(user.id.clone(), user);
        }
        let mut ingame = IngameState::new(game, players);
        let mut out = Outbox::new();
        out.notify(
            Notification::ReadyToStart,
            users.keys().cloned().collect(),
        );
        ingame.first_start(&mut out);
        log::info!("session {id} started with {} players", users.len());
        (
            Session {
                id: id.to_string(),
                users,
                ingame,
            },
            out.drain(),
        )
    }

    /// Handle one inbound message, run-to-completion, and return the
    /// outbound events it produced. A rejection produces exactly one
    /// direct message to the sender and nothing else.
    pub fn handle_message(&mut self, user: &UserId, msg: &ClientMessage) -> Vec<Outbound> {
        let mut out = Outbox::new();
        let result = if self.users.contains_key(user) {
            self.ingame.on_client_message(user, msg, &mut out)
        } else {
            Err(Rejection::UnknownUser)
        };
        if let Err(reason) = result {
            log::debug!("rejected message from {user}: {reason}");
            // Rejections carry no partial mutation; drop whatever a
            // handler queued before its validation failed.
            let mut out = Outbox::new();
            out.direct(user, ServerMessage::ActionRejected { reason });
            return out.drain();
        }
        out.drain()
    }

    /// Session lifecycle state for persistence.
    pub fn state(&self) -> &'static str {
        if self.ingame.is_cancelled() {
            "cancelled"
        } else if self.ingame.is_ended() {
            "ended"
        } else {
            "ongoing"
        }
    }

    /// Snapshot the session through the backend: the full admin view plus
    /// one censored view per player.
    pub fn save_to(&self, backend: &dyn Backend) -> Result<(), BackendError> {
        let serialized = self.ingame.serialize_to_client(true, None)?;
        let mut views = BTreeMap::new();
        for player in self.ingame.players.values() {
            views.insert(
                player.user.clone(),
                self.ingame.serialize_to_client(false, Some(player))?,
            );
        }
        let players: Vec<Player> = self.ingame.players.values().cloned().collect();
        backend.save_game(
            &self.id,
            &serialized,
            &views,
            &players,
            self.state(),
            env!("CARGO_PKG_VERSION"),
        )
    }

    /// Reconstruct a session from its persisted admin view.
    pub fn restore(
        id: &str,
        users: BTreeMap<UserId, User>,
        serialized: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let ingame = IngameState::from_serialized(serialized)?;
        Ok(Session {
            id: id.to_string(),
            users,
            ingame,
        })
    }

    /// Forward queued notification events to the backend's hooks; the
    /// remaining broadcast/direct messages are returned for the transport.
    pub fn dispatch_notifications(
        backend: &dyn Backend,
        events: Vec<Outbound>,
    ) -> Result<Vec<Outbound>, BackendError> {
        let mut remaining = Vec::new();
        for event in events {
            match event {
                Outbound::Notify { kind, users } => match kind {
                    Notification::ReadyToStart => backend.notify_ready_to_start(&users)?,
                    Notification::YourTurn => backend.notify_your_turn(&users)?,
                    Notification::BattleResults => backend.notify_battle_results(&users)?,
                    Notification::NewVote => backend.notify_new_vote(&users)?,
                    Notification::GameEnded => backend.notify_game_ended(&users)?,
                },
                other => remaining.push(other),
            }
        }
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::demo_session;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        saves: Mutex<Vec<(String, String, usize)>>,
        notified: Mutex<Vec<(String, Vec<UserId>)>>,
    }

    impl Backend for RecordingBackend {
        fn get_user(&self, _id: &UserId) -> Result<Option<User>, BackendError> {
            Ok(None)
        }
        fn get_game(&self, _id: &str) -> Result<Option<serde_json::Value>, BackendError> {
            Ok(None)
        }
        fn save_game(
            &self,
            id: &str,
            _serialized_game: &serde_json::Value,
            view_for_each_player: &BTreeMap<UserId, serde_json::Value>,
            _players: &[Player],
            state: &str,
            _version: &str,
        ) -> Result<(), BackendError> {
            self.saves.lock().unwrap().push((
                id.to_string(),
                state.to_string(),
                view_for_each_player.len(),
            ));
            Ok(())
        }
        fn notify_ready_to_start(&self, users: &[UserId]) -> Result<(), BackendError> {
            self.notified
                .lock()
                .unwrap()
                .push(("ready-to-start".into(), users.to_vec()));
            Ok(())
        }
        fn notify_your_turn(&self, users: &[UserId]) -> Result<(), BackendError> {
            self.notified
                .lock()
                .unwrap()
                .push(("your-turn".into(), users.to_vec()));
            Ok(())
        }
        fn notify_battle_results(&self, users: &[UserId]) -> Result<(), BackendError> {
            self.notified
                .lock()
                .unwrap()
                .push(("battle-results".into(), users.to_vec()));
            Ok(())
        }
        fn notify_new_vote(&self, users: &[UserId]) -> Result<(), BackendError> {
            self.notified
                .lock()
                .unwrap()
                .push(("new-vote".into(), users.to_vec()));
            Ok(())
        }
        fn notify_game_ended(&self, users: &[UserId]) -> Result<(), BackendError> {
            self.notified
                .lock()
                .unwrap()
                .push(("game-ended".into(), users.to_vec()));
            Ok(())
        }
        fn create_chat_room(&self, name: &str) -> Result<String, BackendError> {
            Ok(format!("chat-{name}"))
        }
    }

    #[test]
    fn test_unknown_user_gets_direct_rejection_only() {
        let (mut session, _) = demo_session();
        let events = session.handle_message(
            &UserId::from("nobody"),
            &ClientMessage::LaunchCancelGameVote,
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Outbound::Direct(
                user,
                ServerMessage::ActionRejected {
                    reason: Rejection::UnknownUser
                }
            ) if *user == UserId::from("nobody")
        ));
    }

    #[test]
    fn test_rejection_produces_no_broadcast() {
        let (mut session, _) = demo_session();
        // u2 acts during planning with a message planning cannot take.
        let events = session.handle_message(
            &UserId::from("u2"),
            &ClientMessage::CombatBid { power_tokens: 1 },
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Outbound::Direct(..)));
    }

    #[test]
    fn test_save_snapshots_one_view_per_player() {
        let (session, _) = demo_session();
        let backend = RecordingBackend::default();
        session.save_to(&backend).unwrap();
        let saves = backend.saves.lock().unwrap();
        assert_eq!(saves.len(), 1);
        let (id, state, view_count) = &saves[0];
        assert_eq!(id, "demo");
        assert_eq!(state, "ongoing");
        assert_eq!(*view_count, 3);
    }

    #[test]
    fn test_restore_round_trips() {
        let (session, _) = demo_session();
        let snapshot = session.ingame.serialize_to_client(true, None).unwrap();
        let restored =
            Session::restore("demo", session.users.clone(), snapshot.clone()).unwrap();
        assert_eq!(
            restored.ingame.serialize_to_client(true, None).unwrap(),
            snapshot
        );
        assert_eq!(restored.state(), session.state());
        assert_eq!(restored.ingame.waited_users(), session.ingame.waited_users());
    }

    #[test]
    fn test_notifications_dispatch_to_backend_hooks() {
        let (_, events) = demo_session();
        let backend = RecordingBackend::default();
        let remaining = Session::dispatch_notifications(&backend, events).unwrap();
        let notified = backend.notified.lock().unwrap();
        // Session start queues ready-to-start and planning's your-turn.
        assert!(notified.iter().any(|(k, _)| k == "ready-to-start"));
        assert!(notified.iter().any(|(k, _)| k == "your-turn"));
        // Notifications never leak into the transport list.
        assert!(remaining
            .iter()
            .all(|e| !matches!(e, Outbound::Notify { .. })));
    }
}
