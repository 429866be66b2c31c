//! Credential store seam and in-memory implementation.
//!
//! The presence engine never sees stored secrets. It hands the plaintext from
//! a join request to a [`RoomRegistry`] exactly once and acts on the verdict.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{
    env::Environment,
    error::{CredentialError, RegistrationError},
};

type HmacSha256 = Hmac<Sha256>;

/// Minimum room id length accepted at registration, in characters.
pub const MIN_ROOM_ID_LEN: usize = 3;

/// Minimum owner username length accepted at registration, in characters.
pub const MIN_OWNER_LEN: usize = 3;

/// Minimum password length accepted at registration, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

const SALT_LEN: usize = 16;

/// Proof that a join request presented valid credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomGrant {
    /// Room the credentials open
    pub room_id: String,
}

/// Validates room credentials.
///
/// Implementations may suspend (database, remote service). Callers must treat
/// [`CredentialError::Unavailable`] as transient and never as a rejection.
#[async_trait]
pub trait RoomRegistry: Send + Sync + 'static {
    /// Check `password` against the room registered as `room_id`.
    async fn verify_room_credentials(
        &self,
        room_id: &str,
        password: &str,
    ) -> Result<RoomGrant, CredentialError>;
}

/// New room to register.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomRegistration {
    /// Room id, unique within the store
    pub room_id: String,
    /// Username of the member who created the room
    pub owner: String,
    /// Plaintext password. Digested on registration and then dropped.
    pub password: String,
}

impl std::fmt::Debug for RoomRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistration")
            .field("room_id", &self.room_id)
            .field("owner", &self.owner)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone)]
struct StoredRoom {
    salt: [u8; SALT_LEN],
    digest: Vec<u8>,
}

/// In-memory credential store.
///
/// Passwords are kept as salted HMAC-SHA-256 digests, keyed by a random
/// per-room salt. Clones share the same underlying table.
#[derive(Clone, Default)]
pub struct MemoryRoomRegistry {
    rooms: Arc<RwLock<HashMap<String, StoredRoom>>>,
}

impl MemoryRoomRegistry {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new room.
    ///
    /// # Errors
    ///
    /// - Length violations (`RoomIdTooShort`, `UsernameTooShort`,
    ///   `PasswordTooShort`), checked in that order
    /// - `RoomTaken` if the id is already registered
    /// - `Unavailable` if the table lock is poisoned
    pub fn register<E: Environment>(
        &self,
        env: &E,
        registration: RoomRegistration,
    ) -> Result<(), RegistrationError> {
        let RoomRegistration { room_id, owner, password } = registration;

        if room_id.chars().count() < MIN_ROOM_ID_LEN {
            return Err(RegistrationError::RoomIdTooShort { min: MIN_ROOM_ID_LEN });
        }
        if owner.chars().count() < MIN_OWNER_LEN {
            return Err(RegistrationError::UsernameTooShort { min: MIN_OWNER_LEN });
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(RegistrationError::PasswordTooShort { min: MIN_PASSWORD_LEN });
        }

        let mut salt = [0u8; SALT_LEN];
        env.random_bytes(&mut salt);
        let digest = digest_password(&salt, &password)
            .map_err(|e| RegistrationError::Unavailable(e.to_string()))?;

        let mut rooms =
            self.rooms.write().map_err(|e| RegistrationError::Unavailable(e.to_string()))?;

        if rooms.contains_key(&room_id) {
            return Err(RegistrationError::RoomTaken(room_id));
        }

        tracing::debug!(room_id = %room_id, owner = %owner, "room registered");
        rooms.insert(room_id, StoredRoom { salt, digest });

        Ok(())
    }

    /// Synchronous credential check.
    ///
    /// The digest comparison is constant-time.
    pub fn verify(&self, room_id: &str, password: &str) -> Result<RoomGrant, CredentialError> {
        let rooms = self.rooms.read().map_err(|e| CredentialError::Unavailable(e.to_string()))?;
        let room = rooms.get(room_id).ok_or(CredentialError::NotFound)?;

        let mut mac = HmacSha256::new_from_slice(&room.salt)
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?;
        mac.update(password.as_bytes());
        mac.verify_slice(&room.digest).map_err(|_| CredentialError::Mismatch)?;

        Ok(RoomGrant { room_id: room_id.to_string() })
    }

    /// Registered room ids, sorted.
    pub fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match self.rooms.read() {
            Ok(rooms) => rooms.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        ids.sort();
        ids
    }

    /// Number of registered rooms.
    pub fn len(&self) -> usize {
        self.rooms.read().map_or(0, |rooms| rooms.len())
    }

    /// Returns true if no room is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RoomRegistry for MemoryRoomRegistry {
    async fn verify_room_credentials(
        &self,
        room_id: &str,
        password: &str,
    ) -> Result<RoomGrant, CredentialError> {
        self.verify(room_id, password)
    }
}

fn digest_password(salt: &[u8], password: &str) -> Result<Vec<u8>, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(salt)?;
    mac.update(password.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}
