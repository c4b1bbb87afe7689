// Public modules
pub mod client;
pub mod commands;
pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fragments;
pub mod render;
pub mod run;
pub mod sse;
pub mod types;
pub mod ui;

mod observability;

// Re-exports
pub use client::{Completion, CompletionClient};
pub use commands::{COMMAND_TOKENS, Command, CommandHandler, help_text, parse_command};
pub use completion::{CommandCompleter, candidates};
pub use config::{Config, MindTermArgs};
pub use diagnostics::{Diagnostics, MemoryDiagnostics, StderrDiagnostics};
pub use error::{Error, Result};
pub use fragments::FragmentStream;
pub use observability::register_biometrics;
pub use render::{LiveRegion, RefreshLimiter, TerminalLiveRegion, render_stream};
pub use run::{Assistant, ResponseMode, run, run_loop};
pub use types::*;
pub use ui::{ChatUi, LineReader, ReadLine, TerminalUi};
