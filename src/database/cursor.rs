//! Pagination cursor codec
//!
//! A cursor is the storage engine's resume key (the key attributes of the last
//! item a caller saw) rendered as JSON and wrapped in URL-safe base64, so it can
//! travel through query strings untouched. Decoding fails closed: anything that
//! does not reconstruct a well-formed resume key is rejected.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::utils::errors::{StorageError, StorageResult};

pub const ATTR_PK: &str = "pk";
pub const ATTR_SK: &str = "sk";
pub const ATTR_INDEX_PK: &str = "index_pk";
pub const ATTR_INDEX_SK: &str = "index_sk";

const KNOWN_ATTRIBUTES: [&str; 4] = [ATTR_PK, ATTR_SK, ATTR_INDEX_PK, ATTR_INDEX_SK];

/// Longest cursor string accepted by `decode`
pub const MAX_CURSOR_LENGTH: usize = 2048;

/// Native resume token of a query: key attribute name to value
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeKey(BTreeMap<String, String>);

impl ResumeKey {
    /// Resume key of a primary-key query
    pub fn primary(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(ATTR_PK.to_string(), pk.into());
        attributes.insert(ATTR_SK.to_string(), sk.into());
        Self(attributes)
    }

    /// Resume key of a secondary index query
    pub fn indexed(
        pk: impl Into<String>,
        sk: impl Into<String>,
        index_pk: impl Into<String>,
        index_sk: impl Into<String>,
    ) -> Self {
        let mut key = Self::primary(pk, sk);
        key.0.insert(ATTR_INDEX_PK.to_string(), index_pk.into());
        key.0.insert(ATTR_INDEX_SK.to_string(), index_sk.into());
        key
    }

    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.0.get(attribute).map(String::as_str)
    }

    pub fn pk(&self) -> Option<&str> {
        self.get(ATTR_PK)
    }

    pub fn sk(&self) -> Option<&str> {
        self.get(ATTR_SK)
    }

    pub fn index_pk(&self) -> Option<&str> {
        self.get(ATTR_INDEX_PK)
    }

    pub fn index_sk(&self) -> Option<&str> {
        self.get(ATTR_INDEX_SK)
    }

    /// Whether this key came from a secondary index query
    pub fn is_indexed(&self) -> bool {
        self.0.contains_key(ATTR_INDEX_PK)
    }

    fn validate(&self) -> StorageResult<()> {
        if let Some(unknown) = self.0.keys().find(|k| !KNOWN_ATTRIBUTES.contains(&k.as_str())) {
            return Err(StorageError::InvalidCursor(format!("unknown attribute {unknown}")));
        }
        if let Some((name, _)) = self.0.iter().find(|(_, v)| v.is_empty()) {
            return Err(StorageError::InvalidCursor(format!("empty attribute {name}")));
        }
        if self.pk().is_none() || self.sk().is_none() {
            return Err(StorageError::InvalidCursor("missing primary key attributes".to_string()));
        }
        if self.index_pk().is_some() != self.index_sk().is_some() {
            return Err(StorageError::InvalidCursor("incomplete index attributes".to_string()));
        }
        Ok(())
    }
}

/// Encode a resume key as an opaque cursor string
pub fn encode(key: &ResumeKey) -> String {
    let json = serde_json::Value::Object(
        key.0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    );
    URL_SAFE_NO_PAD.encode(json.to_string())
}

/// Decode an opaque cursor string back into a resume key
pub fn decode(cursor: &str) -> StorageResult<ResumeKey> {
    if cursor.is_empty() || cursor.len() > MAX_CURSOR_LENGTH {
        return Err(StorageError::InvalidCursor(format!(
            "cursor length {} outside 1..={MAX_CURSOR_LENGTH}",
            cursor.len()
        )));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| StorageError::InvalidCursor(format!("not base64url: {e}")))?;
    let key: ResumeKey = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::InvalidCursor(format!("not a resume key: {e}")))?;

    key.validate()?;
    Ok(key)
}
