use crate::domain::AliasLookup;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Radio-ID subscriber dump indexed by callsign. Values are the entries re-serialized as
/// compact JSON, ready to be shown as-is.
#[derive(Clone, Debug, Default)]
pub struct SubscriberDirectory {
    by_callsign: HashMap<String, String>,
}

impl SubscriberDirectory {
    pub fn len(&self) -> usize {
        self.by_callsign.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_callsign.is_empty()
    }
}

impl AliasLookup for SubscriberDirectory {
    fn lookup(&self, talker: &str) -> Option<String> {
        self.by_callsign.get(talker).cloned()
    }
}

#[derive(Debug, Error)]
pub enum LoadSubscribersError {
    #[error("failed to read subscriber file: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse subscriber file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("subscriber file has no users list")]
    UnexpectedShape,
}

/// A missing file is an empty directory.
pub fn load_subscribers(path: &Path) -> Result<SubscriberDirectory, LoadSubscribersError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(SubscriberDirectory::default());
        }
        Err(error) => return Err(error.into()),
    };
    parse_subscribers(&raw)
}

/// Accepts `{"users": [...]}`, `{"results": [...]}` or a bare array. The first entry for a
/// callsign wins.
pub fn parse_subscribers(raw: &str) -> Result<SubscriberDirectory, LoadSubscribersError> {
    let value: Value = serde_json::from_str(raw)?;
    let entries = match &value {
        Value::Array(entries) => entries,
        Value::Object(map) => match map.get("users").or_else(|| map.get("results")) {
            Some(Value::Array(entries)) => entries,
            _ => return Err(LoadSubscribersError::UnexpectedShape),
        },
        _ => return Err(LoadSubscribersError::UnexpectedShape),
    };

    let mut by_callsign = HashMap::with_capacity(entries.len());
    for entry in entries {
        let Some(callsign) = entry.get("callsign").and_then(Value::as_str) else {
            continue;
        };
        let callsign = callsign.trim();
        if callsign.is_empty() || by_callsign.contains_key(callsign) {
            continue;
        }
        by_callsign.insert(callsign.to_string(), entry.to_string());
    }
    Ok(SubscriberDirectory { by_callsign })
}
