#![forbid(unsafe_code)]

//! Wire model of the remote update response.
//!
//! A response carries exactly one logical part: a **directive** (policy-only
//! instruction, no assets) or a **manifest** (new update description plus
//! its required assets). The distinct directive variants drive different
//! control paths via exhaustive matching.

use airlift_store::{AssetHash, AssetRecord, UpdateId, UpdateRecord, UpdateStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("malformed update response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("update response carries neither a directive nor a manifest")]
    Empty,

    #[error("update response carries both a directive and a manifest")]
    Ambiguous,
}

/// Policy-only remote instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateDirective {
    /// Keep the current update.
    NoUpdateAvailable,
    /// Discard remote updates and run from embedded assets.
    RollBackToEmbedded,
}

/// One asset the manifest requires: content hash, source URL, content kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    pub hash: AssetHash,
    pub url: Url,
    pub kind: String,
    /// Shipped inside the application build; the launcher may substitute
    /// the bundled copy if the store has no downloaded file.
    #[serde(default)]
    pub embedded: bool,
}

impl AssetDescriptor {
    pub(crate) fn to_record(&self, relative_path: Option<String>) -> AssetRecord {
        AssetRecord {
            hash: self.hash,
            url: self.url.clone(),
            kind: self.kind.clone(),
            embedded: self.embedded,
            relative_path,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestBody {
    id: Uuid,
    created_at: DateTime<Utc>,
    runtime_version: String,
    launch_asset: AssetDescriptor,
    #[serde(default)]
    assets: Vec<AssetDescriptor>,
}

/// The manifest part of an update response.
#[derive(Debug, Clone)]
pub struct ManifestPart {
    body: ManifestBody,
    /// The raw manifest JSON, preserved verbatim as the update's metadata.
    raw: serde_json::Value,
}

impl ManifestPart {
    #[must_use]
    pub fn update_id(&self) -> UpdateId {
        UpdateId::from(self.body.id)
    }

    #[must_use]
    pub fn runtime_version(&self) -> &str {
        &self.body.runtime_version
    }

    #[must_use]
    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    /// Every asset this manifest requires, launch asset first.
    #[must_use]
    pub fn required_assets(&self) -> Vec<&AssetDescriptor> {
        std::iter::once(&self.body.launch_asset)
            .chain(self.body.assets.iter())
            .collect()
    }

    /// The update record this manifest describes, as it will be committed.
    #[must_use]
    pub fn to_update_record(&self) -> UpdateRecord {
        UpdateRecord {
            id: self.update_id(),
            commit_time: self.body.created_at,
            runtime_version: self.body.runtime_version.clone(),
            manifest: self.raw.clone(),
            status: UpdateStatus::Committed,
            launch_asset: self.body.launch_asset.hash,
        }
    }
}

/// The discriminated top-level response.
#[derive(Debug, Clone)]
pub enum UpdateResponse {
    Directive(UpdateDirective),
    Manifest(ManifestPart),
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    directive: Option<UpdateDirective>,
    manifest: Option<serde_json::Value>,
}

impl UpdateResponse {
    /// Parse a response body.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError`] if the body is not valid JSON, carries
    /// neither part, or carries both.
    pub fn parse(bytes: &[u8]) -> Result<Self, ResponseError> {
        let envelope: ResponseEnvelope = serde_json::from_slice(bytes)?;
        match (envelope.directive, envelope.manifest) {
            (Some(_), Some(_)) => Err(ResponseError::Ambiguous),
            (None, None) => Err(ResponseError::Empty),
            (Some(directive), None) => Ok(Self::Directive(directive)),
            (None, Some(raw)) => {
                let body: ManifestBody = serde_json::from_value(raw.clone())?;
                Ok(Self::Manifest(ManifestPart { body, raw }))
            }
        }
    }
}
