//! Jarvis: a voice-driven desktop assistant.
//!
//! Spoken or typed commands go through [`router::CommandRouter`] to the local
//! handlers; whatever none of them claims is answered by the language model.
//! The same router backs the voice-platform skill webhook in [`bridge`].

pub mod assistant;
pub mod audio;
pub mod bridge;
pub mod config;
pub mod error;
pub mod llm;
pub mod media;
pub mod paths;
pub mod pictures;
pub mod preflight;
pub mod reminders;
pub mod router;
pub mod speech;
pub mod store;
pub mod system;
pub mod todo;
pub mod ui;
pub mod validation;
pub mod youtube;
