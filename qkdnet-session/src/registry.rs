//! Store for derived session keys.
//!
//! Only derived encryption keys and their salts are kept; raw QKD output is
//! handed to the caller and never stored here.

use std::collections::BTreeMap;
use std::fmt;

use qkdnet_core::SecretKey;
use qkdnet_crypto::Salt;
use qkdnet_entropy::{EntropyError, EntropySource};
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Fresh identifiers drawn before `insert` gives up on the entropy source.
pub const MAX_ID_ATTEMPTS: u32 = 8;

/// Seconds since the Unix epoch.
pub type UnixSeconds = u64;

/// Random 16-byte registry handle, shown as hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId([u8; 16]);

impl KeyId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn generate(entropy: &mut dyn EntropySource) -> Result<Self, SessionError> {
        let mut bytes = [0u8; 16];
        entropy.try_fill_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionKeyRecord {
    pub derived_key: SecretKey,
    pub salt: Salt,
    pub created_at: UnixSeconds,
    pub expires_at: UnixSeconds,
}

impl SessionKeyRecord {
    pub fn is_expired(&self, now: UnixSeconds) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct KeyRegistry {
    records: BTreeMap<KeyId, SessionKeyRecord>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` under a fresh identifier.
    ///
    /// A source that keeps producing identifiers already in use is treated
    /// as unavailable after [`MAX_ID_ATTEMPTS`] draws.
    pub fn insert(
        &mut self,
        record: SessionKeyRecord,
        entropy: &mut dyn EntropySource,
    ) -> Result<KeyId, SessionError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = KeyId::generate(entropy)?;
            if self.records.contains_key(&id) {
                warn!(key_id = %id, "generated key id already in use");
                continue;
            }
            debug!(key_id = %id, expires_at = record.expires_at, "session key stored");
            self.records.insert(id, record);
            return Ok(id);
        }
        Err(SessionError::RandomnessUnavailable(EntropyError::Exhausted {
            attempts: MAX_ID_ATTEMPTS,
            last: Box::new(EntropyError::Service(
                "entropy source keeps repeating key ids".into(),
            )),
        }))
    }

    /// Fetch a live record; expired records are refused until rotated.
    pub fn lookup(&self, id: &KeyId, now: UnixSeconds) -> Result<&SessionKeyRecord, SessionError> {
        let record = self.records.get(id).ok_or(SessionError::UnknownKey(*id))?;
        if record.is_expired(now) {
            return Err(SessionError::KeyExpired(*id));
        }
        Ok(record)
    }

    /// Replace the record behind `id`, expired or not, returning the old one.
    pub fn rotate(
        &mut self,
        id: &KeyId,
        record: SessionKeyRecord,
    ) -> Result<SessionKeyRecord, SessionError> {
        let slot = self
            .records
            .get_mut(id)
            .ok_or(SessionError::UnknownKey(*id))?;
        info!(key_id = %id, expires_at = record.expires_at, "session key rotated");
        Ok(std::mem::replace(slot, record))
    }

    pub fn remove(&mut self, id: &KeyId) -> Option<SessionKeyRecord> {
        self.records.remove(id)
    }

    pub fn contains(&self, id: &KeyId) -> bool {
        self.records.contains_key(id)
    }

    /// Drop every record expired at `now`; returns how many were removed.
    pub fn purge_expired(&mut self, now: UnixSeconds) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
