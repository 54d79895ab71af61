//! Durable cross-session memory: a single markdown file with three
//! sections (event log, per-rule context, user preferences) that an MCP
//! chat client can read back to stay coherent across restarts.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;

const EVENT_LOG_HEADER: &str = "## Event Log";
const RULE_CONTEXT_HEADER: &str = "## Rule Context";
const PREFERENCES_HEADER: &str = "## User Preferences";
const MAX_EVENTS: usize = 500;

#[derive(Debug, Clone, Default)]
struct Sections {
    events: Vec<String>,
    rule_context: Vec<String>,
    preferences: Vec<String>,
}

enum Section {
    None,
    Events,
    RuleContext,
    Preferences,
}

fn parse(text: &str) -> Sections {
    let mut sections = Sections::default();
    let mut current = Section::None;

    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed == EVENT_LOG_HEADER {
            current = Section::Events;
            continue;
        }
        if trimmed == RULE_CONTEXT_HEADER {
            current = Section::RuleContext;
            continue;
        }
        if trimmed == PREFERENCES_HEADER {
            current = Section::Preferences;
            continue;
        }
        if trimmed.starts_with("## ") {
            current = Section::None;
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        match current {
            Section::Events => sections.events.push(trimmed.to_string()),
            Section::RuleContext => sections.rule_context.push(trimmed.to_string()),
            Section::Preferences => sections.preferences.push(trimmed.to_string()),
            Section::None => {}
        }
    }
    sections
}

fn render(sections: &Sections) -> String {
    let mut out = String::new();
    out.push_str(EVENT_LOG_HEADER);
    out.push('\n');
    for line in &sections.events {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(RULE_CONTEXT_HEADER);
    out.push('\n');
    for line in &sections.rule_context {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(PREFERENCES_HEADER);
    out.push('\n');
    for line in &sections.preferences {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Markdown-backed persistence for cross-session memory. Every operation
/// is a whole-file read-modify-write under an internal mutex — there is no
/// cross-instance lock because the daemon owns exactly one `MemoryStore`
/// per configured memory file.
pub struct MemoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MemoryStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read_all(&self) -> String {
        let _guard = self.lock.lock().await;
        self.read_raw()
    }

    pub async fn append_event(&self, event: &str) -> Result<(), String> {
        let _guard = self.lock.lock().await;
        let mut sections = parse(&self.read_raw());
        let line = format!("- {} | {}", Utc::now().to_rfc3339(), event);
        sections.events.insert(0, line);
        if sections.events.len() > MAX_EVENTS {
            sections.events.truncate(MAX_EVENTS);
        }
        self.write_raw(&render(&sections))
    }

    pub async fn get_recent_events(&self, count: usize) -> Vec<String> {
        let _guard = self.lock.lock().await;
        let sections = parse(&self.read_raw());
        sections.events.into_iter().take(count).collect()
    }

    pub async fn set_rule_context(&self, rule_id: &str, context: &str) -> Result<(), String> {
        let _guard = self.lock.lock().await;
        let mut sections = parse(&self.read_raw());
        let prefix = format!("- {rule_id} |");
        sections.rule_context.retain(|line| !line.starts_with(&prefix));
        sections.rule_context.push(format!("{prefix} {context}"));
        self.write_raw(&render(&sections))
    }

    pub async fn remove_rule_context(&self, rule_id: &str) -> Result<(), String> {
        let _guard = self.lock.lock().await;
        let mut sections = parse(&self.read_raw());
        let prefix = format!("- {rule_id} |");
        sections.rule_context.retain(|line| !line.starts_with(&prefix));
        self.write_raw(&render(&sections))
    }

    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), String> {
        let _guard = self.lock.lock().await;
        let mut sections = parse(&self.read_raw());
        let prefix = format!("- {key} |");
        sections.preferences.retain(|line| !line.starts_with(&prefix));
        sections.preferences.push(format!("{prefix} {value}"));
        self.write_raw(&render(&sections))
    }

    fn read_raw(&self) -> String {
        std::fs::read_to_string(&self.path).unwrap_or_default()
    }

    fn write_raw(&self, text: &str) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("could not create {}: {e}", parent.display()))?;
            }
        }
        std::fs::write(&self.path, text)
            .map_err(|e| format!("could not write {}: {e}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("physical-mcp-memtest-{}-{}", std::process::id(), name));
        p
    }

    #[tokio::test]
    async fn append_event_then_read_back() {
        let path = temp_path("events.md");
        let store = MemoryStore::new(&path);
        store.append_event("person arrived at door").await.unwrap();
        let events = store.get_recent_events(10).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("person arrived at door"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn events_are_capped_at_500_most_recent_first() {
        let path = temp_path("capped.md");
        let store = MemoryStore::new(&path);
        for i in 0..510 {
            store.append_event(&format!("event {i}")).await.unwrap();
        }
        let events = store.get_recent_events(600).await;
        assert_eq!(events.len(), MAX_EVENTS);
        assert!(events[0].contains("event 509"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn set_rule_context_upserts_by_rule_id() {
        let path = temp_path("rule_ctx.md");
        let store = MemoryStore::new(&path);
        store.set_rule_context("r_1", "first note").await.unwrap();
        store.set_rule_context("r_1", "updated note").await.unwrap();
        let text = store.read_all().await;
        assert!(text.contains("updated note"));
        assert!(!text.contains("first note"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn remove_rule_context_deletes_entry() {
        let path = temp_path("rule_rm.md");
        let store = MemoryStore::new(&path);
        store.set_rule_context("r_1", "note").await.unwrap();
        store.remove_rule_context("r_1").await.unwrap();
        let text = store.read_all().await;
        assert!(!text.contains("r_1"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn set_preference_upserts_by_key() {
        let path = temp_path("prefs.md");
        let store = MemoryStore::new(&path);
        store.set_preference("notify_style", "terse").await.unwrap();
        store.set_preference("notify_style", "verbose").await.unwrap();
        let text = store.read_all().await;
        assert!(text.contains("verbose"));
        assert!(!text.contains("terse"));
        let _ = std::fs::remove_file(&path);
    }
}
