//! The interactive tutor: REPL configuration, slash commands and the orchestrator that turns a
//! question into a streamed, recorded reply.
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: slash command parsing
//! - [`orchestrator`]: the Idle/Responding interaction driver

mod commands;
mod config;
mod orchestrator;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_ENV_FILE};
pub use orchestrator::{Orchestrator, OrchestratorState};
