use std::collections::HashMap;

use tokio::sync::mpsc;

use intruso_common::lobby::RoomCode;
use intruso_common::player::{ConnectionId, UserId, UserProfile};
use intruso_common::protocol::ServerMessage;

/// Live state of one connection.
pub struct Session {
    pub connection_id: ConnectionId,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
    /// Set once the client authenticated or was restored.
    pub profile: Option<UserProfile>,
    pub room: Option<RoomCode>,
}

impl Session {
    pub fn new(connection_id: ConnectionId, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            connection_id,
            tx,
            profile: None,
            room: None,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.profile.as_ref().map(|p| p.id)
    }

    /// Queue a message for the writer task. A closed channel means the
    /// connection is already going away.
    pub fn send(&self, msg: ServerMessage) {
        let _ = self.tx.send(msg);
    }
}

#[derive(Default)]
pub struct Sessions {
    sessions: HashMap<ConnectionId, Session>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.connection_id, session);
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection_id)
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    pub fn set_room(&mut self, connection_id: ConnectionId, room: Option<RoomCode>) {
        if let Some(session) = self.sessions.get_mut(&connection_id) {
            session.room = room;
        }
    }

    pub fn set_profile(&mut self, connection_id: ConnectionId, profile: UserProfile) {
        if let Some(session) = self.sessions.get_mut(&connection_id) {
            session.profile = Some(profile);
        }
    }

    /// Replace the profile on every connection of `profile.id`.
    pub fn update_profile(&mut self, profile: &UserProfile) {
        for session in self.sessions.values_mut() {
            if session.user_id() == Some(profile.id) {
                session.profile = Some(profile.clone());
            }
        }
    }

    pub fn send_to(&self, connection_id: ConnectionId, msg: ServerMessage) {
        if let Some(session) = self.sessions.get(&connection_id) {
            session.send(msg);
        }
    }

    pub fn broadcast_all(&self, msg: &ServerMessage) {
        for session in self.sessions.values() {
            session.send(msg.clone());
        }
    }

    pub fn broadcast_room(&self, code: &str, msg: &ServerMessage) {
        for session in self.sessions.values() {
            if session.room.as_deref() == Some(code) {
                session.send(msg.clone());
            }
        }
    }

    /// Logged-in users, one entry per user, sorted by name.
    pub fn online_users(&self) -> Vec<UserProfile> {
        let mut by_id: HashMap<UserId, &UserProfile> = HashMap::new();
        for profile in self.sessions.values().filter_map(|s| s.profile.as_ref()) {
            by_id.insert(profile.id, profile);
        }
        let mut users: Vec<UserProfile> = by_id.into_values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        users
    }

    /// Tell every session in `code` the room is gone and detach them from it.
    /// Returns how many sessions were evicted.
    pub fn evict_room(&mut self, code: &str) -> usize {
        let mut evicted = 0;
        for session in self.sessions.values_mut() {
            if session.room.as_deref() == Some(code) {
                session.send(ServerMessage::ForcedRoomTeardown { code: code.to_string() });
                session.room = None;
                evicted += 1;
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session(sessions: &mut Sessions) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        sessions.insert(Session::new(id, tx));
        (id, rx)
    }

    #[test]
    fn test_broadcast_room_only_reaches_members() {
        let mut sessions = Sessions::new();
        let (a, mut rx_a) = session(&mut sessions);
        let (_b, mut rx_b) = session(&mut sessions);
        sessions.set_room(a, Some("123456".into()));

        sessions.broadcast_room("123456", &ServerMessage::Pong);
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Pong);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_online_users_dedup_and_sort() {
        let mut sessions = Sessions::new();
        let (a, _rx_a) = session(&mut sessions);
        let (b, _rx_b) = session(&mut sessions);
        let (c, _rx_c) = session(&mut sessions);
        let (_anon, _rx_d) = session(&mut sessions);

        let zoe = UserProfile::new(Uuid::new_v4(), "Zoe");
        let ana = UserProfile::new(Uuid::new_v4(), "Ana");
        sessions.set_profile(a, zoe.clone());
        sessions.set_profile(b, ana.clone());
        sessions.set_profile(c, zoe.clone());

        let names: Vec<String> = sessions.online_users().into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["Ana".to_string(), "Zoe".to_string()]);
    }

    #[test]
    fn test_evict_room_clears_references() {
        let mut sessions = Sessions::new();
        let (a, mut rx_a) = session(&mut sessions);
        let (b, _rx_b) = session(&mut sessions);
        sessions.set_room(a, Some("111111".into()));
        sessions.set_room(b, Some("222222".into()));

        assert_eq!(sessions.evict_room("111111"), 1);
        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerMessage::ForcedRoomTeardown { code: "111111".into() }
        );
        assert!(sessions.get(a).unwrap().room.is_none());
        assert_eq!(sessions.get(b).unwrap().room.as_deref(), Some("222222"));
    }
}
