use crate::WhitelistError;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde::de::IgnoredAny;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Shape of a stairsplus dump. Values of `shaped_nodes` are not needed here.
#[derive(Deserialize)]
struct FilterDocument {
    shaped_nodes: FxHashMap<String, IgnoredAny>,
    aliases: FxHashMap<String, String>,
}

/// Maps every accepted node name (shaped node or alias) to its shaped node.
///
/// Names are compared as exact bytes: no trimming and no case folding.
#[derive(Debug, Clone, Default)]
pub struct FilterTable {
    map: FxHashMap<Vec<u8>, Vec<u8>>,
}

impl FilterTable {
    /// Read and parse a stairsplus dump from disk.
    pub fn load(path: &Path) -> Result<Self, WhitelistError> {
        let bytes = fs::read(path).map_err(|e| {
            WhitelistError::MalformedFilter(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, WhitelistError> {
        let document: FilterDocument = serde_json::from_slice(bytes)?;

        let mut map = FxHashMap::default();
        for (alias, shaped) in document.aliases {
            map.insert(alias.into_bytes(), shaped.into_bytes());
        }
        // Shaped nodes always resolve to themselves, even if an alias claims the same name.
        for shaped in document.shaped_nodes.into_keys() {
            let key = shaped.as_bytes().to_vec();
            if let Some(previous) = map.insert(key.clone(), key) {
                if previous != shaped.as_bytes() {
                    warn!(
                        node = %shaped,
                        alias_target = %String::from_utf8_lossy(&previous),
                        "alias shadows a shaped node; keeping the shaped node"
                    );
                }
            }
        }

        debug!(entries = map.len(), "filter table loaded");
        Ok(Self { map })
    }

    pub fn lookup(&self, name: &[u8]) -> Option<&[u8]> {
        self.map.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
