//! The interactive read-evaluate-render loop.

use async_trait::async_trait;
use tracing::info;

use crate::client::{Completion, CompletionClient};
use crate::commands::{Command, parse_command};
use crate::config::Config;
use crate::error::Error;
use crate::fragments::FragmentStream;
use crate::observability::REPL_TURNS;
use crate::ui::{ChatUi, TerminalUi};

/// Message printed when no API key is configured.
pub const MISSING_API_KEY: &str = "Error: OPENAI_API_KEY environment variable is not set.";

/// A model that answers one message at a time.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Answers `text` with a single complete response.
    async fn get_completion(&self, text: &str) -> Completion;

    /// Answers `text` with a lazily streamed response.
    fn get_completion_streamed(&self, text: &str) -> FragmentStream;
}

#[async_trait]
impl Assistant for CompletionClient {
    async fn get_completion(&self, text: &str) -> Completion {
        CompletionClient::get_completion(self, text).await
    }

    fn get_completion_streamed(&self, text: &str) -> FragmentStream {
        CompletionClient::get_completion_streamed(self, text)
    }
}

/// How responses are fetched and shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Stream fragments into a live region.
    Streamed,

    /// Wait for the whole response, then render it once.
    Single,
}

impl ResponseMode {
    /// The mode selected by `config`.
    pub fn for_config(config: &Config) -> Self {
        if config.stream {
            ResponseMode::Streamed
        } else {
            ResponseMode::Single
        }
    }
}

/// Runs the chat session until the user leaves or input ends.
///
/// Blank input re-prompts without contacting the model.  `\help` shows the
/// command summary and `\bye` ends the session; every other line is sent to
/// the model verbatim.  The goodbye banner is always shown.
pub async fn run_loop<A, U>(assistant: &A, ui: &mut U, mode: ResponseMode)
where
    A: Assistant + ?Sized,
    U: ChatUi + ?Sized,
{
    info!(?mode, "chat session started");
    ui.display_welcome();

    loop {
        let input = match ui.get_user_input() {
            Ok(Some(input)) => input,
            Ok(None) => break,
            Err(err) => {
                ui.display_error(&err.to_string());
                break;
            }
        };
        if input.trim().is_empty() {
            continue;
        }

        match parse_command(&input) {
            Some(Command::Bye) => break,
            Some(Command::Help) => ui.display_help(),
            None => {
                REPL_TURNS.click();
                match mode {
                    ResponseMode::Streamed => {
                        let fragments = assistant.get_completion_streamed(&input);
                        ui.display_streamed_response(fragments).await;
                    }
                    ResponseMode::Single => {
                        let completion = assistant.get_completion(&input).await;
                        ui.display_response(completion.text());
                    }
                }
            }
        }
    }

    ui.display_goodbye();
    info!("chat session ended");
}

/// Starts MindTerm on the process terminal.
///
/// Configuration problems are reported and end the process before any
/// prompt is shown.
pub async fn run(config: Config) {
    if !config.validate() {
        println!("{MISSING_API_KEY}");
        return;
    }

    let client = match CompletionClient::new(&config) {
        Ok(client) => client,
        Err(err) => {
            println!("Error initializing client: {err}");
            return;
        }
    };

    let mut ui = match TerminalUi::stdio(config.use_color) {
        Ok(ui) => ui,
        Err(err) => {
            println!("{}", terminal_failure(&err));
            return;
        }
    };

    run_loop(&client, &mut ui, ResponseMode::for_config(&config)).await;
}

fn terminal_failure(err: &Error) -> String {
    format!("Error initializing terminal: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_follows_config() {
        let config = Config::default();
        assert_eq!(ResponseMode::for_config(&config), ResponseMode::Streamed);
        let config = config.with_streaming(false);
        assert_eq!(ResponseMode::for_config(&config), ResponseMode::Single);
    }

    #[test]
    fn terminal_failure_names_the_terminal() {
        let message = terminal_failure(&Error::input("cannot open line editor: no tty"));
        assert!(message.starts_with("Error initializing terminal:"));
        assert!(message.contains("cannot open line editor: no tty"));
        assert!(!message.contains("client"));
    }
}
