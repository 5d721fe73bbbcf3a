use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;

use intruso_common::player::{PlayerStats, ProfileUpdate, UserId, UserProfile};

use crate::error::CommandError;
use crate::room::FinishedMatch;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("user {0} not found")]
    NotFound(UserId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub profile: UserProfile,
    pub stats: PlayerStats,
}

/// Persistence for user profiles and their stats.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, ProfileError>;

    /// Case-insensitive lookup by display name.
    async fn find_user_by_name(&self, name: &str) -> Result<Option<UserRecord>, ProfileError>;

    async fn save_user_profile(&self, profile: &UserProfile, stats: &PlayerStats) -> Result<(), ProfileError>;

    async fn register_user(&self, profile: &UserProfile) -> Result<UserRecord, ProfileError>;
}

#[derive(Default)]
pub struct MemoryProfileStore {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, ProfileError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<UserRecord>, ProfileError> {
        let name = name.to_lowercase();
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|record| record.profile.name.to_lowercase() == name)
            .cloned())
    }

    async fn save_user_profile(&self, profile: &UserProfile, stats: &PlayerStats) -> Result<(), ProfileError> {
        let mut users = self.users.write().await;
        let record = users.get_mut(&profile.id).ok_or(ProfileError::NotFound(profile.id))?;
        record.profile = profile.clone();
        record.stats = stats.clone();
        Ok(())
    }

    async fn register_user(&self, profile: &UserProfile) -> Result<UserRecord, ProfileError> {
        let mut users = self.users.write().await;
        if users.contains_key(&profile.id) {
            return Err(ProfileError::Conflict(format!("user {} exists", profile.id)));
        }
        let lowered = profile.name.to_lowercase();
        if users.values().any(|r| r.profile.name.to_lowercase() == lowered) {
            return Err(ProfileError::Conflict(format!("name `{}` is taken", profile.name)));
        }
        let record = UserRecord {
            profile: profile.clone(),
            stats: PlayerStats::default(),
        };
        users.insert(profile.id, record.clone());
        Ok(record)
    }
}

/// Suffixed variants tried before a guest name counts as taken.
const NAME_ATTEMPTS: usize = 8;

/// Guest-style login: update a known user's public fields, or register a new
/// one. A name owned by another user gets a random numeric suffix.
pub async fn authenticate(store: &dyn ProfileStore, mut profile: UserProfile) -> Result<UserRecord, CommandError> {
    profile.name = free_name(store, &profile).await?;

    if let Some(mut record) = store.get_user_by_id(profile.id).await? {
        record.profile.merge_public_fields(&profile);
        store.save_user_profile(&record.profile, &record.stats).await?;
        return Ok(record);
    }

    match store.register_user(&profile).await {
        Ok(record) => Ok(record),
        Err(ProfileError::Conflict(_)) => Err(CommandError::NameTaken),
        Err(e) => Err(e.into()),
    }
}

async fn free_name(store: &dyn ProfileStore, profile: &UserProfile) -> Result<String, CommandError> {
    let mut name = profile.name.clone();
    for _ in 0..NAME_ATTEMPTS {
        match store.find_user_by_name(&name).await? {
            Some(owner) if owner.profile.id != profile.id => {
                let suffix: u16 = rand::thread_rng().gen_range(0..1000);
                name = format!("{}_{}", profile.name, suffix);
            }
            _ => return Ok(name),
        }
    }
    Err(CommandError::NameTaken)
}

/// Apply avatar/accessory changes to `current`'s stored profile.
pub async fn update_profile(
    store: &dyn ProfileStore,
    current: &UserProfile,
    update: &ProfileUpdate,
) -> Result<UserRecord, CommandError> {
    let mut record = match store.get_user_by_id(current.id).await? {
        Some(record) => record,
        None => store.register_user(current).await?,
    };
    record.profile.apply(update);
    store.save_user_profile(&record.profile, &record.stats).await?;
    Ok(record)
}

/// Count a finished match for every participant. Games already recorded are
/// skipped. Returns how many players were updated.
pub async fn record_match_results(store: &dyn ProfileStore, finished: &FinishedMatch) -> usize {
    let mut recorded = 0;
    for result in &finished.results {
        let mut record = match store.get_user_by_id(result.user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(user = %result.user_id, "No stored profile, skipping stats");
                continue;
            }
            Err(e) => {
                tracing::warn!(user = %result.user_id, "Failed to load stats: {}", e);
                continue;
            }
        };

        if !record.stats.record(&finished.game_id, result.faction, result.won) {
            continue;
        }
        match store.save_user_profile(&record.profile, &record.stats).await {
            Ok(()) => recorded += 1,
            Err(e) => tracing::warn!(user = %result.user_id, "Failed to save stats: {}", e),
        }
    }
    tracing::info!(game = %finished.game_id, recorded, "Match stats recorded");
    recorded
}
