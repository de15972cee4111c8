//! Versioned bucket-metadata snapshot.
//!
//! Shares the version/uuid lifecycle discipline of the cluster map: the uuid
//! ties bucket metadata to one cluster identity, and `BucketMeta.uuid` must
//! equal `ClusterMap.uuid` once both are initialized.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::traits::VersionedMeta;

/// Per-bucket configuration distributed by the primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketProps {
    /// Keep multiple object versions.
    pub versioning: bool,
    /// Number of local mirror copies per object.
    pub mirror_copies: u32,
    /// Track object access times.
    pub access_time_updates: bool,
}

impl Default for BucketProps {
    fn default() -> Self {
        Self {
            versioning: false,
            mirror_copies: 1,
            access_time_updates: true,
        }
    }
}

/// Versioned, uuid-tagged snapshot of bucket configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketMeta {
    pub uuid: String,
    pub version: i64,
    pub buckets: BTreeMap<String, BucketProps>,
}

impl BucketMeta {
    /// An empty snapshot: version 0, no uuid, no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, bucket: &str) -> Option<&BucketProps> {
        self.buckets.get(bucket)
    }

    pub fn set(&mut self, bucket: impl Into<String>, props: BucketProps) {
        self.buckets.insert(bucket.into(), props);
    }
}

impl VersionedMeta for BucketMeta {
    fn version(&self) -> i64 {
        self.version
    }

    fn uuid(&self) -> &str {
        &self.uuid
    }
}

impl fmt::Display for BucketMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uuid = if self.uuid.is_empty() { "-" } else { &self.uuid };
        write!(
            f,
            "BucketMeta v{}[uuid={}, buckets={}]",
            self.version,
            uuid,
            self.buckets.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_meta_is_empty_and_unversioned() {
        let bmeta = BucketMeta::new();
        assert_eq!(bmeta.version, 0);
        assert!(bmeta.uuid.is_empty());
        assert!(bmeta.buckets.is_empty());
    }

    #[test]
    fn set_and_get_bucket_props() {
        let mut bmeta = BucketMeta::new();
        bmeta.set(
            "logs",
            BucketProps {
                versioning: true,
                ..BucketProps::default()
            },
        );
        assert!(bmeta.get("logs").unwrap().versioning);
        assert!(bmeta.get("missing").is_none());
    }

    #[test]
    fn serde_round_trip_preserves_all_fields() {
        let mut bmeta = BucketMeta::new();
        bmeta.uuid = "U-1".to_string();
        bmeta.version = 9;
        bmeta.set("media", BucketProps::default());
        let json = serde_json::to_string(&bmeta).unwrap();
        let decoded: BucketMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(bmeta, decoded);
    }

    #[test]
    fn display_summarizes_identity() {
        let mut bmeta = BucketMeta::new();
        bmeta.uuid = "U-1".to_string();
        bmeta.version = 2;
        assert_eq!(bmeta.to_string(), "BucketMeta v2[uuid=U-1, buckets=0]");
    }
}
