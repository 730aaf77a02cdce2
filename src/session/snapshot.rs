//! Flat, serializable session state.
//!
//! Layout: `{ "program": [...], "sessionId": "...", "ontology": { "types": [...],
//! "relationships": [...], "constraints": [...], "synonyms": {...} } }`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{SessionError, SessionResult};
use crate::ontology::Ontology;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub program: Vec<String>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub ontology: Ontology,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> SessionResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SessionError::Snapshot {
            message: format!("serialize: {e}"),
        })
    }

    pub fn from_json(json: &str) -> SessionResult<Self> {
        serde_json::from_str(json).map_err(|e| SessionError::Snapshot {
            message: format!("parse: {e}"),
        })
    }

    pub fn save_to(&self, path: &Path) -> SessionResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SessionError::Snapshot {
                message: format!("create {}: {e}", parent.display()),
            })?;
        }
        std::fs::write(path, self.to_json()?).map_err(|e| SessionError::Snapshot {
            message: format!("write {}: {e}", path.display()),
        })
    }

    pub fn load_from(path: &Path) -> SessionResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| SessionError::Snapshot {
            message: format!("read {}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }
}
