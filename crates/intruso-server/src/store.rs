use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use intruso_common::lobby::{RoomCode, RoomSnapshot, RoomStatus};
use intruso_common::player::{ConnectionId, UserId, UserProfile};
use intruso_common::settings::SettingsChange;
use intruso_common::words::WordSource;

use crate::error::CommandError;
use crate::room::{FinishedMatch, Room};

pub type RoomHandle = Arc<Mutex<Room>>;
pub type RoomGuard = OwnedMutexGuard<Room>;

/// What is left after a player leaves.
pub struct Departure {
    /// `None` when the room emptied and was removed.
    pub room: Option<RoomGuard>,
    pub finished: Option<FinishedMatch>,
}

/// Registry of live rooms keyed by join code.
///
/// Lock order is registry, then room. The registry lock is never held while
/// waiting for a room that may already be locked by someone else.
pub struct RoomStore {
    rooms: RwLock<HashMap<RoomCode, RoomHandle>>,
    sequence: AtomicU64,
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn create_room(&self, host: &UserProfile, connection_id: ConnectionId) -> RoomGuard {
        let mut rooms = self.rooms.write().await;
        let code = fresh_code(&rooms);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        let handle = Arc::new(Mutex::new(Room::new(code.clone(), sequence, host, connection_id)));
        rooms.insert(code.clone(), handle.clone());
        tracing::info!(room = %code, host = %host.name, "Room created");

        // Nobody else can see this mutex yet.
        handle.lock_owned().await
    }

    async fn handle(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(code).cloned()
    }

    /// Lock a live room. Rooms that were closed while we waited count as gone.
    pub async fn lock(&self, code: &str) -> Result<RoomGuard, CommandError> {
        let handle = self.handle(code).await.ok_or(CommandError::RoomNotFound)?;
        let guard = handle.lock_owned().await;
        if guard.is_closed() || guard.is_empty() {
            return Err(CommandError::RoomNotFound);
        }
        Ok(guard)
    }

    /// Join (or rejoin) a room. The flag is true when an existing member
    /// was moved to a new connection.
    pub async fn join_room(
        &self,
        code: &str,
        profile: &UserProfile,
        connection_id: ConnectionId,
    ) -> Result<(RoomGuard, bool), CommandError> {
        let mut room = self.lock(code).await?;
        let rejoined = room.add_player(profile, connection_id)?;
        if !rejoined {
            tracing::info!(room = %code, player = %profile.name, "Player joined");
        }
        Ok((room, rejoined))
    }

    pub async fn leave_room(&self, code: &str, user_id: UserId) -> Result<Departure, CommandError> {
        let room = self.lock(code).await?;
        self.leave_locked(room, user_id).await
    }

    /// Remove a player from an already locked room, deleting it once empty.
    pub async fn leave_locked(&self, mut room: RoomGuard, user_id: UserId) -> Result<Departure, CommandError> {
        let finished = room.remove_player(user_id)?;
        if !room.is_empty() {
            tracing::debug!(room = %room.code, players = room.players.len(), "Player left");
            return Ok(Departure {
                room: Some(room),
                finished,
            });
        }

        room.close();
        let code = room.code.clone();
        let handle = OwnedMutexGuard::mutex(&room).clone();
        drop(room);

        self.remove_if_same(&code, &handle).await;
        tracing::info!(room = %code, "Room emptied and removed");
        Ok(Departure { room: None, finished })
    }

    pub async fn update_settings(
        &self,
        code: &str,
        issuer: UserId,
        change: SettingsChange,
        words: &dyn WordSource,
    ) -> Result<RoomGuard, CommandError> {
        let mut room = self.lock(code).await?;
        room.update_settings(issuer, change, words)?;
        Ok(room)
    }

    pub async fn set_status(&self, code: &str, status: RoomStatus) -> Result<RoomGuard, CommandError> {
        let mut room = self.lock(code).await?;
        room.set_status(status);
        Ok(room)
    }

    /// Close the room behind `handle` and drop it from the registry. Returns
    /// false if it was already closed (emptied or deleted before).
    pub async fn delete_room(&self, code: &str, handle: &RoomHandle) -> bool {
        {
            let mut room = handle.lock().await;
            if room.is_closed() {
                return false;
            }
            room.close();
        }
        self.remove_if_same(code, handle).await;
        tracing::info!(room = %code, "Room deleted");
        true
    }

    async fn remove_if_same(&self, code: &str, handle: &RoomHandle) -> bool {
        let mut rooms = self.rooms.write().await;
        match rooms.get(code) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                rooms.remove(code);
                true
            }
            _ => false,
        }
    }

    async fn handles(&self) -> Vec<RoomHandle> {
        self.rooms.read().await.values().cloned().collect()
    }

    /// Joinable public rooms, newest first. Must not be called while holding
    /// a room guard.
    pub async fn list_public(&self) -> Vec<RoomSnapshot> {
        let mut listed = Vec::new();
        for handle in self.handles().await {
            let room = handle.lock().await;
            if room.is_listed() {
                listed.push((room.sequence, room.snapshot()));
            }
        }
        listed.sort_by(|a, b| b.0.cmp(&a.0));
        listed.into_iter().map(|(_, snapshot)| snapshot).collect()
    }

    /// Code of the live room holding a player slot for `user_id`. Must not be
    /// called while holding a room guard.
    pub async fn find_user_room(&self, user_id: UserId) -> Option<RoomCode> {
        for handle in self.handles().await {
            let room = handle.lock().await;
            if !room.is_closed() && room.contains(user_id) {
                return Some(room.code.clone());
            }
        }
        None
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

fn fresh_code(rooms: &HashMap<RoomCode, RoomHandle>) -> RoomCode {
    let mut rng = rand::thread_rng();
    loop {
        let code = rng.gen_range(100_000..=999_999u32).to_string();
        if !rooms.contains_key(&code) {
            return code;
        }
    }
}
