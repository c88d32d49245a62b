#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::error::StoreError;

/// Opaque update identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateId(pub Uuid);

impl UpdateId {
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for UpdateId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Content identity of an asset: SHA-256 of its bytes.
///
/// The hex rendering doubles as the asset's on-disk file name, so an asset
/// shared by several updates is stored exactly once.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetHash([u8; 32]);

impl AssetHash {
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    #[must_use]
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for AssetHash {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| StoreError::InvalidHash(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StoreError::InvalidHash(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for AssetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AssetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetHash({})", self.to_hex())
    }
}

impl Serialize for AssetHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AssetHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Commit status of a persisted update.
///
/// There is no "pending" state on disk: the loader only ever persists an
/// update once every required asset is present, so a record either exists
/// committed or does not exist at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// All required assets were downloaded and verified.
    Committed,
    /// Shipped inside the application build. Never reclaimable.
    Embedded,
}

/// A versioned bundle of application content.
///
/// Immutable once committed; destroyed only by the reaper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub id: UpdateId,
    pub commit_time: DateTime<Utc>,
    pub runtime_version: String,
    /// Opaque structured metadata from the remote manifest.
    pub manifest: serde_json::Value,
    pub status: UpdateStatus,
    /// The asset the host executes to start this update.
    pub launch_asset: AssetHash,
}

impl UpdateRecord {
    /// Whether this record may be offered to selection or launch.
    #[must_use]
    pub fn is_launchable(&self) -> bool {
        matches!(self.status, UpdateStatus::Committed | UpdateStatus::Embedded)
    }
}

/// A single content-addressed file referenced by one or more updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub hash: AssetHash,
    pub url: Url,
    /// Opaque content kind (e.g. `bundle`, `image`, `font`).
    pub kind: String,
    /// Shipped inside the application build rather than fetched.
    pub embedded: bool,
    /// Path relative to the updates directory, set once the verified file
    /// exists on disk. `None` means "not present".
    pub relative_path: Option<String>,
}

impl AssetRecord {
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.relative_path.is_some()
    }
}
