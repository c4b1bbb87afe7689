//! Terminal user interface.
//!
//! [`TerminalUi`] owns the line editor and the output writer.  Both sit
//! behind small seams ([`LineReader`] and [`std::io::Write`]) so the run loop
//! can be driven by scripted input in tests.

use std::io::{self, Stdout, Write};

use async_trait::async_trait;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use termimad::MadSkin;

use crate::commands::{help_text, help_tip};
use crate::completion::CommandCompleter;
use crate::error::{Error, Result};
use crate::fragments::FragmentStream;
use crate::render::{
    DEFAULT_REFRESH_PER_SECOND, RefreshLimiter, TerminalLiveRegion, render_markdown,
    render_stream, terminal_height, terminal_width,
};

/// Prompt shown before every line of input.
pub const PROMPT: &str = "MindTerm: ";

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_DIM: &str = "\x1b[2m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_BOLD_BLUE: &str = "\x1b[1;34m";
const ANSI_BOLD_TEAL: &str = "\x1b[1;36m";

/// Outcome of reading one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    /// A line of text, without the trailing newline.
    Line(String),

    /// The user pressed Ctrl+C while typing.
    Interrupted,

    /// Input is exhausted (Ctrl+D or closed stdin).
    Eof,
}

/// A source of interactive input lines.
pub trait LineReader {
    /// Reads one line after showing `prompt`.
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine>;
}

impl LineReader for Editor<CommandCompleter, DefaultHistory> {
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine> {
        match self.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.add_history_entry(line.as_str());
                }
                Ok(ReadLine::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadLine::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadLine::Eof),
            Err(err) => Err(Error::input(err.to_string())),
        }
    }
}

/// Everything the run loop needs from a user interface.
#[async_trait(?Send)]
pub trait ChatUi {
    /// Shows the opening banner.
    fn display_welcome(&mut self);

    /// Shows the command summary.
    fn display_help(&mut self);

    /// Shows the closing banner.
    fn display_goodbye(&mut self);

    /// Shows an error message.
    fn display_error(&mut self, message: &str);

    /// Reads the next user input.
    ///
    /// Returns `Some("")` when the user interrupted the line and `None` when
    /// input is exhausted.
    fn get_user_input(&mut self) -> Result<Option<String>>;

    /// Shows a complete response, or a notice when there is none.
    fn display_response(&mut self, response: Option<&str>);

    /// Renders a response live as its fragments arrive.
    ///
    /// A failure diagnostic carried by `fragments` is emitted only after the
    /// rendered text is final.
    async fn display_streamed_response(&mut self, fragments: FragmentStream);
}

/// The interactive terminal front end.
pub struct TerminalUi<L: LineReader, W: Write> {
    reader: L,
    out: W,
    skin: MadSkin,
    use_color: bool,
    width: Option<usize>,
    height: Option<usize>,
    refresh_per_second: u32,
}

impl TerminalUi<Editor<CommandCompleter, DefaultHistory>, Stdout> {
    /// Creates a UI on the process terminal with command autocompletion.
    pub fn stdio(use_color: bool) -> Result<Self> {
        let mut editor = Editor::<CommandCompleter, DefaultHistory>::new()
            .map_err(|err| Error::input(format!("cannot open line editor: {err}")))?;
        editor.set_helper(Some(CommandCompleter::new(use_color)));
        Ok(Self::new(editor, io::stdout(), use_color))
    }
}

impl<L: LineReader, W: Write> TerminalUi<L, W> {
    /// Creates a UI reading from `reader` and writing to `out`.
    pub fn new(reader: L, out: W, use_color: bool) -> Self {
        let skin = if use_color {
            MadSkin::default()
        } else {
            MadSkin::no_style()
        };
        Self {
            reader,
            out,
            skin,
            use_color,
            width: None,
            height: None,
            refresh_per_second: DEFAULT_REFRESH_PER_SECOND,
        }
    }

    /// Fixes the render width instead of querying the terminal.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    /// Fixes the live region height instead of querying the terminal.
    pub fn with_height(mut self, height: usize) -> Self {
        self.height = Some(height);
        self
    }

    /// Sets the ceiling on live redraws per second; zero disables it.
    pub fn with_refresh_per_second(mut self, refresh_per_second: u32) -> Self {
        self.refresh_per_second = refresh_per_second;
        self
    }

    /// The writer output goes to.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Consumes the UI and returns its writer.
    pub fn into_output(self) -> W {
        self.out
    }

    fn width(&self) -> usize {
        self.width.unwrap_or_else(terminal_width)
    }

    fn paint(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn rule(&self, title: &str) -> String {
        let width = self.width().min(100);
        let label = format!(" {title} ");
        let fill = width.saturating_sub(label.chars().count());
        let left = fill / 2;
        let right = fill - left;
        let line = format!("{}{label}{}", "─".repeat(left), "─".repeat(right));
        self.paint(ANSI_BOLD_BLUE, &line)
    }

    fn emit(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

#[async_trait(?Send)]
impl<L: LineReader, W: Write> ChatUi for TerminalUi<L, W> {
    fn display_welcome(&mut self) {
        let banner = format!(
            "\n{}\n\n{}\n{}\n\n",
            self.rule("Mind Terminal"),
            self.paint(
                ANSI_BOLD_BLUE,
                "Welcome to Mind Terminal - Your AI Coding Assistant"
            ),
            self.paint(ANSI_DIM, "Type '\\help' for available commands"),
        );
        self.emit(&banner);
    }

    fn display_help(&mut self) {
        let mut lines = help_text().lines();
        let heading = lines.next().unwrap_or_default();
        let mut text = format!("\n{}\n", self.paint(ANSI_BOLD_BLUE, heading));
        for line in lines {
            text.push_str(line);
            text.push('\n');
        }
        text.push('\n');
        text.push_str(&self.paint(ANSI_DIM, help_tip()));
        text.push_str("\n\n");
        self.emit(&text);
    }

    fn display_goodbye(&mut self) {
        let banner = format!(
            "\n{}\n{}\n\n",
            self.rule("Session Ended"),
            self.paint(ANSI_DIM, "Thank you for using Mind Terminal!"),
        );
        self.emit(&banner);
    }

    fn display_error(&mut self, message: &str) {
        let text = format!("{}\n", self.paint(ANSI_RED, &format!("Error: {message}")));
        self.emit(&text);
    }

    fn get_user_input(&mut self) -> Result<Option<String>> {
        match self.reader.read_line(PROMPT)? {
            ReadLine::Line(line) => Ok(Some(line)),
            ReadLine::Interrupted => Ok(Some(String::new())),
            ReadLine::Eof => Ok(None),
        }
    }

    fn display_response(&mut self, response: Option<&str>) {
        match response {
            Some(markdown) => {
                let header = format!("\n{}\n", self.paint(ANSI_BOLD_TEAL, "Assistant:"));
                let body = render_markdown(&self.skin, markdown, self.width());
                self.emit(&format!("{header}{body}\n"));
            }
            None => {
                let notice = format!("\n{}\n\n", self.paint(ANSI_RED, "No response received."));
                self.emit(&notice);
            }
        }
    }

    async fn display_streamed_response(&mut self, mut fragments: FragmentStream) {
        let header = format!("\n{}\n", self.paint(ANSI_BOLD_TEAL, "Assistant:"));
        self.emit(&header);

        let width = self.width();
        let height = self.height.unwrap_or_else(terminal_height);
        let mut limiter = RefreshLimiter::new(self.refresh_per_second);
        fragments.defer_diagnostics();
        {
            let mut region =
                TerminalLiveRegion::new(&mut self.out, &self.skin, width).with_height(height);
            render_stream(&mut fragments, &mut region, &mut limiter).await;
        }
        self.emit("\n");
        fragments.report_deferred();
    }
}
