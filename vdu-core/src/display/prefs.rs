//! Persistent display preferences.
//!
//! The only preference today is the "is this the primary display"
//! decision, stored under two legacy key spellings so installs that
//! predate the key rename keep their answer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::VduError;

/// Legacy-compatible keys for the primary display decision. Reads try
/// each in order; writes update all of them.
pub const PRIMARY_DISPLAY_PREF_KEYS: [&str; 2] = [
    "DisplayRepository_isPrimaryDisplaySharedPreferencesKey",
    "flutter.DisplayRepository_isPrimaryDisplaySharedPreferencesKey",
];

// ── PreferenceStore ──────────────────────────────────────────────

/// Key/value storage for small string preferences.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// Reads the primary display decision, trying each legacy key.
///
/// Returns `None` when no key holds a recognizable boolean, which
/// means the operator has never been asked.
pub fn read_primary_display(store: &dyn PreferenceStore) -> Option<bool> {
    for key in PRIMARY_DISPLAY_PREF_KEYS {
        let Some(raw) = store.get(key) else {
            continue;
        };
        if let Some(parsed) = parse_boolean(&raw) {
            return Some(parsed);
        }
        // Some writers JSON-encode the value before storing it.
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
            let unwrapped = match value {
                serde_json::Value::Bool(b) => Some(b),
                serde_json::Value::String(s) => parse_boolean(&s),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(false),
                    Some(1) => Some(true),
                    _ => None,
                },
                _ => None,
            };
            if unwrapped.is_some() {
                return unwrapped;
            }
        }
    }
    None
}

/// Stores the primary display decision under every legacy key.
pub fn store_primary_display(store: &dyn PreferenceStore, is_primary: bool) {
    let encoded = if is_primary { "true" } else { "false" };
    for key in PRIMARY_DISPLAY_PREF_KEYS {
        store.set(key, encoded);
    }
}

/// Parses the boolean spellings accepted by the preference layer.
pub fn parse_boolean(raw: &str) -> Option<bool> {
    match raw.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

// ── FilePreferenceStore ──────────────────────────────────────────

/// JSON-file-backed [`PreferenceStore`].
///
/// The whole map is rewritten on every `set`; preference writes are
/// rare (one per operator decision).
pub struct FilePreferenceStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FilePreferenceStore {
    /// Opens the store, loading existing entries if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VduError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| VduError::Preference(format!("corrupt preference file: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(VduError::Preference(e.to_string())),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        match serde_json::to_string_pretty(entries) {
            Ok(encoded) => {
                if let Err(e) = std::fs::write(&self.path, encoded) {
                    tracing::warn!("failed to persist preferences: {e}");
                }
            }
            Err(e) => tracing::warn!("failed to encode preferences: {e}"),
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
            self.persist(&entries);
        }
    }
}

// ── MemoryPreferenceStore ────────────────────────────────────────

/// In-memory [`PreferenceStore`] for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_reads_as_none() {
        let store = MemoryPreferenceStore::new();
        assert_eq!(read_primary_display(&store), None);
    }

    #[test]
    fn round_trip_writes_all_keys() {
        let store = MemoryPreferenceStore::new();
        store_primary_display(&store, false);
        for key in PRIMARY_DISPLAY_PREF_KEYS {
            assert_eq!(store.get(key).as_deref(), Some("false"));
        }
        assert_eq!(read_primary_display(&store), Some(false));
    }

    #[test]
    fn legacy_key_alone_is_honored() {
        let store = MemoryPreferenceStore::new();
        store.set(PRIMARY_DISPLAY_PREF_KEYS[1], "true");
        assert_eq!(read_primary_display(&store), Some(true));
    }

    #[test]
    fn json_wrapped_values_are_unwrapped() {
        let store = MemoryPreferenceStore::new();
        store.set(PRIMARY_DISPLAY_PREF_KEYS[0], "\"true\"");
        assert_eq!(read_primary_display(&store), Some(true));

        store.set(PRIMARY_DISPLAY_PREF_KEYS[0], "0");
        assert_eq!(read_primary_display(&store), Some(false));
    }

    #[test]
    fn unrecognizable_value_falls_through_to_next_key() {
        let store = MemoryPreferenceStore::new();
        store.set(PRIMARY_DISPLAY_PREF_KEYS[0], "maybe");
        store.set(PRIMARY_DISPLAY_PREF_KEYS[1], "1");
        assert_eq!(read_primary_display(&store), Some(true));
    }

    #[test]
    fn file_store_round_trips() {
        let dir = std::env::temp_dir().join(format!("vdu-prefs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("prefs.json");

        {
            let store = FilePreferenceStore::open(&path).unwrap();
            store_primary_display(&store, true);
        }

        let reopened = FilePreferenceStore::open(&path).unwrap();
        assert_eq!(read_primary_display(&reopened), Some(true));

        std::fs::remove_dir_all(&dir).ok();
    }
}
