//! To-do list persisted in `todo_list.json` as `task-N` → text

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::router::{CommandHandler, Reply};
use crate::store::{id_number, next_sequential_id, JsonFile};
use crate::ui::Overlay;
use crate::validation::{normalize_item_id, validate_item_text};

const ID_PREFIX: &str = "task";
const LIST_OVERLAY_SECS: u64 = 10;

pub type TodoMap = BTreeMap<String, String>;

/// To-do store
pub struct TodoStore {
    file: JsonFile<TodoMap>,
}

impl TodoStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            file: JsonFile::open(path)?,
        })
    }

    /// Add an item under the next free `task-N` id
    pub fn add(&self, text: &str) -> Result<String> {
        let text = text.to_string();
        self.file.update(|map| {
            let id = next_sequential_id(ID_PREFIX, map.keys());
            map.insert(id.clone(), text);
            (id, true)
        })
    }

    pub fn remove(&self, id: &str) -> Result<Option<String>> {
        self.file.update(|map| {
            let removed = map.remove(id);
            let changed = removed.is_some();
            (removed, changed)
        })
    }

    /// Items in creation order
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let mut items: Vec<_> = self.file.load()?.into_iter().collect();
        items.sort_by_key(|(id, _)| id_number(id));
        Ok(items)
    }
}

/// Handles `add task`, `remove task` and `show task(s)`
pub struct TodoTask {
    store: Arc<TodoStore>,
    overlay: Arc<dyn Overlay>,
}

impl TodoTask {
    pub fn new(store: Arc<TodoStore>, overlay: Arc<dyn Overlay>) -> Self {
        Self { store, overlay }
    }

    fn show(&self) -> Result<Reply> {
        let items = self.store.list()?;
        if items.is_empty() {
            return Ok(Reply::say("No tasks found."));
        }

        let lines: Vec<String> = items
            .iter()
            .map(|(id, text)| format!("{}: {}", id, text))
            .collect();
        log::info!("📋 Current tasks:\n{}", lines.join("\n"));

        self.overlay.show_detached(
            "To-Do List",
            &lines.join("\n"),
            Duration::from_secs(LIST_OVERLAY_SECS),
        );

        let mut reply = Reply::say("Here are your tasks.");
        for line in lines {
            reply.push(line);
        }
        Ok(reply)
    }
}

impl CommandHandler for TodoTask {
    fn name(&self) -> &'static str {
        "to-do"
    }

    fn handle(&self, command: &str) -> Result<Option<Reply>> {
        if let Some(text) = command.strip_prefix("add task") {
            // "add task" with nothing after it is not a to-do command
            let Ok(text) = validate_item_text(text) else {
                return Ok(None);
            };
            let id = self.store.add(&text)?;
            log::info!("✔ {} added: {}", id, text);
            return Ok(Some(Reply::say(format!("{} added: {}", id, text))));
        }

        if let Some(raw) = command.strip_prefix("remove task") {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(None);
            }
            // Non-numeric suffixes are looked up verbatim and simply not found
            let id = normalize_item_id(raw, ID_PREFIX).unwrap_or_else(|_| raw.to_string());
            let reply = match self.store.remove(&id)? {
                Some(removed) => {
                    log::info!("🗑 {} removed: {}", id, removed);
                    Reply::say(format!("{} removed.", id))
                }
                None => Reply::say("Task not found."),
            };
            return Ok(Some(reply));
        }

        if command == "show task" || command == "show tasks" {
            return self.show().map(Some);
        }

        Ok(None)
    }
}
