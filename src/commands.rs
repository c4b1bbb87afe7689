//! Built-in commands.
//!
//! Commands are backslash-prefixed words typed at the prompt.  Dispatch is by
//! exact match on the whole line: `\help` is a command, `\help me` and
//! ` \help` are ordinary messages.

use std::collections::HashMap;

/// Every command token known to autocompletion.
pub const COMMAND_TOKENS: [&str; 3] = ["\\chat", "\\bye", "\\help"];

/// A built-in command handled by the run loop instead of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print the command summary.
    Help,

    /// Leave the chat.
    Bye,
}

/// Recognizes a built-in command.
///
/// Returns `None` for anything that should be sent to the model, including
/// `\chat`, which is offered by autocompletion but handled as plain text.
///
/// # Examples
///
/// ```
/// # use mindterm::{Command, parse_command};
/// assert_eq!(parse_command("\\bye"), Some(Command::Bye));
/// assert_eq!(parse_command("\\help"), Some(Command::Help));
/// assert_eq!(parse_command("\\help please"), None);
/// assert_eq!(parse_command("Hello"), None);
/// ```
pub fn parse_command(input: &str) -> Option<Command> {
    match input {
        "\\help" => Some(Command::Help),
        "\\bye" => Some(Command::Bye),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available Commands:

  \chat  - Start a new conversation
  \bye   - Exit the application
  \help  - Show this help message"#
}

/// Hint printed under the command summary.
pub fn help_tip() -> &'static str {
    "Tip: You can start typing your query directly without any command"
}

type Action<C> = Box<dyn FnMut(&mut C)>;

/// A name→action registry for extensible command dispatch.
///
/// Actions receive a mutable context of type `C` chosen by the caller.
///
/// # Examples
///
/// ```
/// # use mindterm::CommandHandler;
/// let mut handler = CommandHandler::new();
/// handler.register("\\count", |n: &mut u32| *n += 1);
///
/// let mut calls = 0;
/// assert!(handler.execute("\\count", &mut calls));
/// assert!(!handler.execute("\\missing", &mut calls));
/// assert_eq!(calls, 1);
/// ```
pub struct CommandHandler<C> {
    actions: HashMap<String, Action<C>>,
    order: Vec<String>,
}

impl<C> CommandHandler<C> {
    /// Creates an empty handler.
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registers `action` under `name`, replacing any earlier registration.
    pub fn register<F>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnMut(&mut C) + 'static,
    {
        let name = name.into();
        if !self.actions.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.actions.insert(name, Box::new(action));
    }

    /// Runs the action registered under `name`.
    ///
    /// Returns true if the command was handled.
    pub fn execute(&mut self, name: &str, context: &mut C) -> bool {
        match self.actions.get_mut(name) {
            Some(action) => {
                action(context);
                true
            }
            None => false,
        }
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered command names in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl<C> Default for CommandHandler<C> {
    fn default() -> Self {
        Self::new()
    }
}
