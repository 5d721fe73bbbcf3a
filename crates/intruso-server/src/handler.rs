use rand::SeedableRng;
use tokio::sync::OwnedMutexGuard;

use intruso_common::lobby::{RoomCode, RoomStatus};
use intruso_common::player::{ConnectionId, PlayerStats, ProfileUpdate, UserId, UserProfile};
use intruso_common::protocol::{ClientMessage, HostAction, ServerMessage};
use intruso_common::settings::SettingsChange;

use crate::error::CommandError;
use crate::profiles;
use crate::room::{FinishedMatch, Room};
use crate::server::SharedState;
use crate::store::{Departure, RoomHandle};

pub async fn handle_message(
    connection_id: ConnectionId,
    msg: ClientMessage,
    state: &SharedState,
) -> anyhow::Result<()> {
    let result = match msg {
        ClientMessage::Hello {
            user_id, reconnect, ..
        } => {
            restore_session(connection_id, user_id, reconnect, state).await;
            Ok(())
        }
        ClientMessage::Authenticate { profile } => authenticate(connection_id, profile, state).await,
        ClientMessage::UpdateProfile { update } => update_profile(connection_id, update, state).await,
        ClientMessage::ListRooms => {
            send_rooms_list(connection_id, state).await;
            Ok(())
        }
        ClientMessage::CreateRoom => create_room(connection_id, state).await,
        ClientMessage::JoinRoom { code } => join_room(connection_id, code, state).await,
        ClientMessage::LeaveRoom => leave_room(connection_id, state).await,
        ClientMessage::UpdateSettings { change } => update_settings(connection_id, change, state).await,
        ClientMessage::StartGame => start_game(connection_id, state).await,
        ClientMessage::PlayerReady => player_ready(connection_id, state).await,
        ClientMessage::NextTurn => next_turn(connection_id, state).await,
        ClientMessage::CastVote { target } => cast_vote(connection_id, target, state).await,
        ClientMessage::HostAction { action } => host_action(connection_id, action, state).await,
        ClientMessage::SendReaction { emoji } => send_reaction(connection_id, emoji, state).await,
        ClientMessage::Ping => {
            send_to(connection_id, ServerMessage::Pong, state).await;
            Ok(())
        }
        // Closed by the connection loop.
        ClientMessage::Disconnect => Ok(()),
    };

    if let Err(e) = result {
        tracing::debug!(connection = %connection_id, "Command rejected: {}", e);
        send_to(connection_id, e.to_message(), state).await;
    }
    Ok(())
}

// -- Identity --

async fn authenticate(connection_id: ConnectionId, profile: UserProfile, state: &SharedState) -> Result<(), CommandError> {
    let record = profiles::authenticate(state.profiles.as_ref(), profile).await?;
    tracing::info!(connection = %connection_id, user = %record.profile.name, "Authenticated");

    {
        let mut sessions = state.sessions.write().await;
        sessions.set_profile(connection_id, record.profile.clone());
        sessions.update_profile(&record.profile);
    }
    refresh_member(&record.profile, state).await;

    send_to(
        connection_id,
        ServerMessage::AuthSuccess {
            profile: record.profile,
            stats: record.stats,
        },
        state,
    )
    .await;
    broadcast_online_users(state).await;
    Ok(())
}

async fn update_profile(connection_id: ConnectionId, update: ProfileUpdate, state: &SharedState) -> Result<(), CommandError> {
    let (current, _) = current_user(connection_id, state).await?;
    let record = profiles::update_profile(state.profiles.as_ref(), &current, &update).await?;

    state.sessions.write().await.update_profile(&record.profile);
    refresh_member(&record.profile, state).await;

    send_to(
        connection_id,
        ServerMessage::ProfileUpdated {
            profile: record.profile,
        },
        state,
    )
    .await;
    broadcast_online_users(state).await;
    Ok(())
}

/// Patch the user's copy in whatever room holds them.
async fn refresh_member(profile: &UserProfile, state: &SharedState) {
    let Some(code) = state.rooms.find_user_room(profile.id).await else {
        return;
    };
    if let Ok(mut room) = state.rooms.lock(&code).await {
        if room.refresh_player(profile) {
            broadcast_snapshot(&room, state).await;
        }
    }
}

// -- Rooms --

async fn create_room(connection_id: ConnectionId, state: &SharedState) -> Result<(), CommandError> {
    let (profile, previous) = current_user(connection_id, state).await?;

    let room = state.rooms.create_room(&profile, connection_id).await;
    let code = room.code.clone();
    {
        let mut sessions = state.sessions.write().await;
        sessions.set_room(connection_id, Some(code.clone()));
        sessions.send_to(connection_id, ServerMessage::RoomJoined { room: room.snapshot() });
    }
    drop(room);

    if let Some(previous) = previous {
        depart(profile.id, &previous, state).await;
    }
    broadcast_rooms_list(state).await;
    Ok(())
}

async fn join_room(connection_id: ConnectionId, code: RoomCode, state: &SharedState) -> Result<(), CommandError> {
    let (profile, previous) = current_user(connection_id, state).await?;

    let (room, rejoined) = state.rooms.join_room(&code, &profile, connection_id).await?;
    tracing::debug!(room = %code, player = %profile.name, rejoined, "Join accepted");
    {
        let mut sessions = state.sessions.write().await;
        sessions.set_room(connection_id, Some(code.clone()));
        sessions.send_to(connection_id, ServerMessage::RoomJoined { room: room.snapshot() });
        sessions.broadcast_room(&code, &ServerMessage::RoomSnapshot { room: room.snapshot() });
    }
    drop(room);

    if let Some(previous) = previous.filter(|previous| *previous != code) {
        depart(profile.id, &previous, state).await;
    }
    broadcast_rooms_list(state).await;
    Ok(())
}

async fn leave_room(connection_id: ConnectionId, state: &SharedState) -> Result<(), CommandError> {
    let (user_id, code) = current_room(connection_id, state).await?;

    state.sessions.write().await.set_room(connection_id, None);
    depart(user_id, &code, state).await;

    send_to(connection_id, ServerMessage::RoomLeft, state).await;
    broadcast_rooms_list(state).await;
    Ok(())
}

/// Take `user_id` out of `code` and tell the remaining members. The caller
/// owns the session's room reference and the rooms list broadcast.
async fn depart(user_id: UserId, code: &str, state: &SharedState) {
    match state.rooms.leave_room(code, user_id).await {
        Ok(departure) => after_departure(departure, state).await,
        Err(e) => tracing::debug!(room = %code, user = %user_id, "Leave ignored: {}", e),
    }
}

async fn after_departure(departure: Departure, state: &SharedState) {
    let Departure { room, finished } = departure;
    if let Some(room) = room {
        broadcast_snapshot(&room, state).await;
    }
    if let Some(finished) = finished {
        record_results(&finished, state).await;
    }
}

async fn update_settings(connection_id: ConnectionId, change: SettingsChange, state: &SharedState) -> Result<(), CommandError> {
    let (user_id, code) = current_room(connection_id, state).await?;

    let room = state
        .rooms
        .update_settings(&code, user_id, change, state.words.as_ref())
        .await?;
    broadcast_snapshot(&room, state).await;
    drop(room);

    broadcast_rooms_list(state).await;
    Ok(())
}

// -- Match --

async fn start_game(connection_id: ConnectionId, state: &SharedState) -> Result<(), CommandError> {
    let (user_id, code) = current_room(connection_id, state).await?;

    let mut room = state.rooms.lock(&code).await?;
    let mut rng = rand::rngs::StdRng::from_entropy();
    room.start_match(user_id, state.words.as_ref(), &mut rng)?;
    tracing::info!(room = %code, players = room.players.len(), "Match started");
    broadcast_snapshot(&room, state).await;
    drop(room);

    broadcast_rooms_list(state).await;
    Ok(())
}

async fn player_ready(connection_id: ConnectionId, state: &SharedState) -> Result<(), CommandError> {
    let (user_id, code) = current_room(connection_id, state).await?;

    let mut room = state.rooms.lock(&code).await?;
    if room.mark_ready(user_id)? {
        tracing::info!(room = %code, "All players ready, rounds begin");
    }
    broadcast_snapshot(&room, state).await;
    Ok(())
}

async fn next_turn(connection_id: ConnectionId, state: &SharedState) -> Result<(), CommandError> {
    let (user_id, code) = current_room(connection_id, state).await?;

    let mut room = state.rooms.lock(&code).await?;
    room.next_turn(user_id)?;
    broadcast_snapshot(&room, state).await;
    Ok(())
}

async fn cast_vote(connection_id: ConnectionId, target: UserId, state: &SharedState) -> Result<(), CommandError> {
    let (user_id, code) = current_room(connection_id, state).await?;

    let mut room = state.rooms.lock(&code).await?;
    let finished = room.cast_vote(user_id, target)?;
    broadcast_snapshot(&room, state).await;
    drop(room);

    if let Some(finished) = finished {
        record_results(&finished, state).await;
    }
    Ok(())
}

async fn record_results(finished: &FinishedMatch, state: &SharedState) {
    profiles::record_match_results(state.profiles.as_ref(), finished).await;
}

// -- Host actions --

async fn host_action(connection_id: ConnectionId, action: HostAction, state: &SharedState) -> Result<(), CommandError> {
    let (user_id, code) = current_room(connection_id, state).await?;

    match action {
        HostAction::Restart => {
            let mut room = state.rooms.lock(&code).await?;
            let released = room.restart(user_id)?;
            tracing::info!(room = %code, released = released.len(), "Match restarted");
            broadcast_snapshot(&room, state).await;
            drop(room);
            broadcast_rooms_list(state).await;
            Ok(())
        }
        HostAction::Delete => delete_room(user_id, code, state).await,
    }
}

async fn delete_room(user_id: UserId, code: RoomCode, state: &SharedState) -> Result<(), CommandError> {
    let mut room = state.rooms.lock(&code).await?;
    if !room.abort(user_id)? {
        return Ok(());
    }
    tracing::info!(room = %code, "Room aborted by host");
    broadcast_snapshot(&room, state).await;
    let handle = OwnedMutexGuard::mutex(&room).clone();
    drop(room);

    broadcast_rooms_list(state).await;
    schedule_teardown(state.clone(), code, handle);
    Ok(())
}

/// After the grace period, drop the room and evict whoever still points at it.
fn schedule_teardown(state: SharedState, code: RoomCode, handle: RoomHandle) {
    let grace = state.config.delete_grace();
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;

        if !state.rooms.delete_room(&code, &handle).await {
            tracing::debug!(room = %code, "Room already gone at teardown");
            return;
        }
        let evicted = state.sessions.write().await.evict_room(&code);
        tracing::info!(room = %code, evicted, "Room torn down");
        broadcast_rooms_list(&state).await;
    });
}

// -- Reactions --

async fn send_reaction(connection_id: ConnectionId, emoji: String, state: &SharedState) -> Result<(), CommandError> {
    let (user_id, code) = current_room(connection_id, state).await?;
    state
        .sessions
        .read()
        .await
        .broadcast_room(&code, &ServerMessage::ReactionReceived { user_id, emoji });
    Ok(())
}

// -- Session lifecycle --

/// Reattach a returning user to their room slot and profile, then bring the
/// connection up to date.
pub async fn restore_session(
    connection_id: ConnectionId,
    user_id: Option<UserId>,
    reconnect: bool,
    state: &SharedState,
) {
    if let Some(user_id) = user_id {
        let fallback = restore_room(connection_id, user_id, state).await;
        restore_profile(connection_id, user_id, reconnect, fallback, state).await;
    }
    send_rooms_list(connection_id, state).await;
    broadcast_online_users(state).await;
}

/// Returns the profile copy from the room slot, if one was found.
async fn restore_room(connection_id: ConnectionId, user_id: UserId, state: &SharedState) -> Option<UserProfile> {
    let code = state.rooms.find_user_room(user_id).await?;
    let mut room = state.rooms.lock(&code).await.ok()?;
    let player = room.reconnect(user_id, connection_id)?.clone();
    tracing::info!(room = %code, player = %player.name, "Session restored");

    let snapshot = room.snapshot();
    let mut sessions = state.sessions.write().await;
    sessions.set_room(connection_id, Some(code.clone()));
    sessions.send_to(
        connection_id,
        ServerMessage::SessionRestored {
            room: snapshot.clone(),
            player: player.clone(),
        },
    );
    sessions.broadcast_room(&code, &ServerMessage::RoomSnapshot { room: snapshot });
    Some(player.profile())
}

async fn restore_profile(
    connection_id: ConnectionId,
    user_id: UserId,
    reconnect: bool,
    fallback: Option<UserProfile>,
    state: &SharedState,
) {
    let record = match state.profiles.get_user_by_id(user_id).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(user = %user_id, "Failed to load profile: {}", e);
            None
        }
    };
    let (profile, stats) = match (record, fallback) {
        (Some(record), _) => (record.profile, record.stats),
        (None, Some(profile)) => (profile, PlayerStats::default()),
        (None, None) => return,
    };

    state.sessions.write().await.set_profile(connection_id, profile.clone());
    if !reconnect {
        send_to(connection_id, ServerMessage::UserRestored { profile, stats }, state).await;
    }
}

pub async fn handle_disconnect(connection_id: ConnectionId, state: &SharedState) {
    let session = state.sessions.write().await.remove(connection_id);
    if let Some(session) = session {
        if let (Some(profile), Some(code)) = (session.profile, session.room) {
            leave_on_disconnect(connection_id, profile.id, &code, state).await;
        }
    }
    broadcast_online_users(state).await;
}

/// Lobby members leave with their connection. During a match the slot stays,
/// flagged disconnected, so the player can come back.
async fn leave_on_disconnect(connection_id: ConnectionId, user_id: UserId, code: &str, state: &SharedState) {
    let Ok(mut room) = state.rooms.lock(code).await else {
        return;
    };
    let owns_slot = room
        .player(user_id)
        .is_some_and(|p| p.connection_id == connection_id);
    if !owns_slot {
        return;
    }
    if room.status != RoomStatus::Lobby {
        room.mark_disconnected(user_id, connection_id);
        tracing::debug!(room = %code, user = %user_id, "Keeping slot after disconnect");
        broadcast_snapshot(&room, state).await;
        return;
    }

    match state.rooms.leave_locked(room, user_id).await {
        Ok(departure) => after_departure(departure, state).await,
        Err(e) => tracing::debug!(room = %code, "Leave on disconnect failed: {}", e),
    }
    broadcast_rooms_list(state).await;
}

// -- Helpers --

/// Profile and room reference of a logged-in session.
async fn current_user(
    connection_id: ConnectionId,
    state: &SharedState,
) -> Result<(UserProfile, Option<RoomCode>), CommandError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(connection_id).ok_or(CommandError::NotLoggedIn)?;
    let profile = session.profile.clone().ok_or(CommandError::NotLoggedIn)?;
    Ok((profile, session.room.clone()))
}

async fn current_room(connection_id: ConnectionId, state: &SharedState) -> Result<(UserId, RoomCode), CommandError> {
    let (profile, room) = current_user(connection_id, state).await?;
    let code = room.ok_or(CommandError::NotInRoom)?;
    Ok((profile.id, code))
}

async fn send_to(connection_id: ConnectionId, msg: ServerMessage, state: &SharedState) {
    state.sessions.read().await.send_to(connection_id, msg);
}

async fn broadcast_snapshot(room: &Room, state: &SharedState) {
    let msg = ServerMessage::RoomSnapshot { room: room.snapshot() };
    state.sessions.read().await.broadcast_room(&room.code, &msg);
}

/// Locks every room in turn, so never call it while holding a room guard.
async fn broadcast_rooms_list(state: &SharedState) {
    let rooms = state.rooms.list_public().await;
    state
        .sessions
        .read()
        .await
        .broadcast_all(&ServerMessage::RoomsList { rooms });
}

async fn send_rooms_list(connection_id: ConnectionId, state: &SharedState) {
    let rooms = state.rooms.list_public().await;
    send_to(connection_id, ServerMessage::RoomsList { rooms }, state).await;
}

async fn broadcast_online_users(state: &SharedState) {
    let sessions = state.sessions.read().await;
    let users = sessions.online_users();
    sessions.broadcast_all(&ServerMessage::OnlineUsers { users });
}
