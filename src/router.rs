//! Command router: keyword handlers tried in a fixed order.
//!
//! Each handler inspects the lowercased command and either claims it with a
//! `Reply` or passes. Unclaimed commands are left to the caller, which sends
//! them to the language model.

use anyhow::Result;
use std::sync::Arc;

/// Lines to speak back (or return over the skill webhook)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
}

impl Reply {
    pub fn say(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// All lines joined for a single text response
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

/// Trait for local command handlers
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the command is not for this handler
    fn handle(&self, command: &str) -> Result<Option<Reply>>;
}

/// Result of routing a command locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub handler: &'static str,
    pub reply: Reply,
}

/// Dispatches to the first handler that claims a command
pub struct CommandRouter {
    handlers: Vec<Arc<dyn CommandHandler>>,
}

impl CommandRouter {
    pub fn new(handlers: Vec<Arc<dyn CommandHandler>>) -> Self {
        Self { handlers }
    }

    /// Normalize spoken text the way every handler expects it
    pub fn normalize(command: &str) -> String {
        command
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Route a command. Returns `None` when no handler matched.
    ///
    /// A failing handler still counts as a match: the failure is logged and
    /// turned into an apology so the command never reaches the model.
    pub fn dispatch(&self, command: &str) -> Option<Routed> {
        let command = Self::normalize(command);
        if command.is_empty() {
            return None;
        }
        log::debug!("Routing command: '{}'", command);

        for handler in &self.handlers {
            match handler.handle(&command) {
                Ok(Some(reply)) => {
                    log::info!("Handled by: {} task", handler.name());
                    return Some(Routed {
                        handler: handler.name(),
                        reply,
                    });
                }
                Ok(None) => continue,
                Err(e) => {
                    log::error!("{} task failed on '{}': {:#}", handler.name(), command, e);
                    return Some(Routed {
                        handler: handler.name(),
                        reply: Reply::say(format!(
                            "Sorry, something went wrong with the {} task.",
                            handler.name()
                        )),
                    });
                }
            }
        }

        log::debug!("No local handler for '{}'", command);
        None
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}
