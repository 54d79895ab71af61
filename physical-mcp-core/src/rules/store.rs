//! YAML persistence for the rule set.

use std::path::{Path, PathBuf};

use log::warn;

use super::models::WatchRule;

/// Loads/saves `Vec<WatchRule>` to a YAML file. Tolerant of a missing or
/// empty file (treated as no rules); a malformed file is logged and
/// treated as empty rather than propagated, since a corrupt rules file
/// should not prevent the daemon from starting.
pub struct RulesStore {
    path: PathBuf,
}

impl RulesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RulesStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Vec<WatchRule> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return Vec::new(),
        };
        if text.trim().is_empty() {
            return Vec::new();
        }
        match serde_yaml::from_str::<Vec<WatchRule>>(&text) {
            Ok(rules) => rules,
            Err(err) => {
                warn!(
                    "rules file {} is malformed, starting with no rules: {err}",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }

    pub fn save(&self, rules: &[WatchRule]) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("could not create {}: {e}", parent.display()))?;
            }
        }
        let text = serde_yaml::to_string(rules)
            .map_err(|e| format!("could not serialize rules: {e}"))?;
        std::fs::write(&self.path, text)
            .map_err(|e| format!("could not write {}: {e}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("physical-mcp-test-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let store = RulesStore::new(temp_path("missing.yaml"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn load_empty_file_returns_empty() {
        let path = temp_path("empty.yaml");
        std::fs::write(&path, "").unwrap();
        let store = RulesStore::new(&path);
        assert!(store.load().is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_malformed_file_returns_empty_not_error() {
        let path = temp_path("malformed.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not: [valid, yaml for rules").unwrap();
        let store = RulesStore::new(&path);
        assert!(store.load().is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = temp_path("roundtrip.yaml");
        let store = RulesStore::new(&path);
        let rules = vec![WatchRule::new("Front door", "someone at the door")];
        store.save(&rules).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Front door");
        let _ = std::fs::remove_file(&path);
    }
}
