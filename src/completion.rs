//! Command autocompletion for the line editor.

use std::borrow::Cow;

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use crate::commands::COMMAND_TOKENS;

/// Command tokens that complete the current line.
///
/// Candidates are offered only while the line starts with `\`, the cursor
/// sits at the end of the line, and the line is a proper prefix of a token.
/// Completing mid-line would corrupt text already typed after the cursor.
pub fn candidates(line: &str, pos: usize) -> Vec<&'static str> {
    if !line.starts_with('\\') || pos != line.len() {
        return Vec::new();
    }
    COMMAND_TOKENS
        .iter()
        .copied()
        .filter(|token| token.len() > line.len() && token.starts_with(line))
        .collect()
}

/// rustyline helper that completes command tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandCompleter {
    use_color: bool,
}

impl CommandCompleter {
    /// Creates a completer; `use_color` dims inline hints.
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let pairs = candidates(line, pos)
            .into_iter()
            .map(|token| Pair {
                display: token.to_string(),
                replacement: token.to_string(),
            })
            .collect();
        Ok((0, pairs))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        match candidates(line, pos).as_slice() {
            [only] => Some(only[line.len()..].to_string()),
            _ => None,
        }
    }
}

impl Highlighter for CommandCompleter {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        if self.use_color {
            Cow::Owned(format!("\x1b[2m{hint}\x1b[0m"))
        } else {
            Cow::Borrowed(hint)
        }
    }
}

impl Validator for CommandCompleter {}

impl Helper for CommandCompleter {}
