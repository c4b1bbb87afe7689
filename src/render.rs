//! Live rendering of streamed responses.
//!
//! A response is accumulated as markdown and redrawn in place as fragments
//! arrive.  Redraws are rate-limited: fragments that arrive faster than the
//! refresh interval are coalesced into the next redraw, and a pending redraw
//! is flushed when the interval elapses even if no new fragment has arrived.

use std::io::Write;
use std::time::Duration;

use futures::StreamExt;
use termimad::MadSkin;
use termimad::crossterm::QueueableCommand;
use termimad::crossterm::cursor::MoveToPreviousLine;
use termimad::crossterm::terminal::{self, Clear, ClearType};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::fragments::FragmentStream;

/// Default ceiling on live redraws per second.
pub const DEFAULT_REFRESH_PER_SECOND: u32 = 15;

/// Width used when the terminal size cannot be determined.
const FALLBACK_WIDTH: usize = 80;

/// Height used when the terminal size cannot be determined.
const FALLBACK_HEIGHT: usize = 24;

/// First line of a live redraw whose top has been cropped.
const CROPPED_MARKER: &str = "…\n";

/// A terminal area that is repeatedly overwritten in place.
pub trait LiveRegion {
    /// Redraw the region with `markdown`, replacing what was drawn before.
    fn update(&mut self, markdown: &str);

    /// Draw the final state and leave it on screen.
    fn finalize(&mut self, markdown: &str);
}

/// Enforces a minimum interval between redraws.
#[derive(Debug, Clone)]
pub struct RefreshLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RefreshLimiter {
    /// Allows at most `refreshes_per_second` redraws per second.  Zero
    /// disables the limit.
    pub fn new(refreshes_per_second: u32) -> Self {
        let interval = if refreshes_per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / refreshes_per_second
        };
        Self {
            interval,
            last: None,
        }
    }

    /// The minimum time between two redraws.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true, and records a redraw, if one is allowed now.
    ///
    /// The first call always succeeds.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Earliest instant at which the next redraw is allowed.
    pub fn next_refresh(&self) -> Instant {
        match self.last {
            Some(last) => last + self.interval,
            None => Instant::now(),
        }
    }

    fn mark(&mut self) {
        self.last = Some(Instant::now());
    }
}

impl Default for RefreshLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_PER_SECOND)
    }
}

/// Streams `fragments` into `region` and returns the final markdown.
///
/// Each fragment is appended to an accumulator that is redrawn at most as
/// often as `limiter` allows.  If the stream ended because of a provider
/// failure, a note naming the failure is appended after the partial text.
/// The region is finalized with the complete text.
pub async fn render_stream<R>(
    fragments: &mut FragmentStream,
    region: &mut R,
    limiter: &mut RefreshLimiter,
) -> String
where
    R: LiveRegion + ?Sized,
{
    let mut markdown = String::new();
    let mut received = 0usize;
    let mut dirty = false;

    loop {
        let next = if dirty {
            match timeout_at(limiter.next_refresh(), fragments.next()).await {
                Ok(next) => next,
                Err(_) => {
                    region.update(&markdown);
                    limiter.mark();
                    dirty = false;
                    continue;
                }
            }
        } else {
            fragments.next().await
        };

        let Some(fragment) = next else {
            break;
        };
        received += 1;
        markdown.push_str(&fragment);
        if limiter.ready() {
            region.update(&markdown);
            dirty = false;
        } else {
            dirty = true;
        }
    }

    debug!(fragments = received, bytes = markdown.len(), "stream finished");
    if let Some(err) = fragments.last_error() {
        if !markdown.is_empty() {
            markdown.push_str("\n\n");
        }
        markdown.push_str(&format!("*Error occurred during streaming: {err}*"));
    }

    region.finalize(&markdown);
    markdown
}

/// Renders markdown through `skin` to a string at `width` columns.
pub fn render_markdown(skin: &MadSkin, markdown: &str, width: usize) -> String {
    skin.text(markdown, Some(width)).to_string()
}

/// Current terminal width, minus one column so that full-width lines never
/// trigger an automatic wrap.
pub fn terminal_width() -> usize {
    terminal::size()
        .map(|(columns, _)| usize::from(columns).saturating_sub(1).max(20))
        .unwrap_or(FALLBACK_WIDTH)
}

/// Rows available to a live region: the terminal height minus the row the
/// cursor rests on after a redraw.
pub fn terminal_height() -> usize {
    terminal::size()
        .map(|(_, rows)| usize::from(rows).saturating_sub(1).max(1))
        .unwrap_or(FALLBACK_HEIGHT)
}

/// A [`LiveRegion`] drawn with termimad on a terminal writer.
///
/// The region remembers how many lines it last drew and moves the cursor
/// back over them before every redraw.  Rows that scrolled off the top of
/// the terminal cannot be reached again, so live redraws are cropped to
/// `height` rows, keeping the most recent text.  Only the final draw shows
/// the whole response.
pub struct TerminalLiveRegion<'a, W: Write> {
    out: &'a mut W,
    skin: &'a MadSkin,
    width: usize,
    height: usize,
    lines_drawn: usize,
}

impl<'a, W: Write> TerminalLiveRegion<'a, W> {
    /// Creates an empty region starting at the cursor, sized to the
    /// terminal's height.
    pub fn new(out: &'a mut W, skin: &'a MadSkin, width: usize) -> Self {
        Self {
            out,
            skin,
            width,
            height: terminal_height(),
            lines_drawn: 0,
        }
    }

    /// Caps live redraws at `height` rows instead of the terminal's height.
    pub fn with_height(mut self, height: usize) -> Self {
        self.height = height.max(1);
        self
    }

    /// Number of terminal lines currently occupied by the region.
    pub fn lines_drawn(&self) -> usize {
        self.lines_drawn
    }

    fn erase(&mut self) {
        if self.lines_drawn > 0 {
            let lines = u16::try_from(self.lines_drawn).unwrap_or(u16::MAX);
            let _ = self.out.queue(MoveToPreviousLine(lines));
            let _ = self.out.queue(Clear(ClearType::FromCursorDown));
            self.lines_drawn = 0;
        }
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

impl<W: Write> LiveRegion for TerminalLiveRegion<'_, W> {
    fn update(&mut self, markdown: &str) {
        self.erase();
        let rendered = render_markdown(self.skin, markdown, self.width);
        let lines: Vec<&str> = rendered.split_inclusive('\n').collect();
        if lines.len() <= self.height {
            self.write(&rendered);
            self.lines_drawn = rendered.matches('\n').count();
        } else {
            let kept = self.height - 1;
            let mut cropped = String::from(CROPPED_MARKER);
            cropped.extend(lines[lines.len() - kept..].iter().copied());
            self.write(&cropped);
            self.lines_drawn = cropped.matches('\n').count();
        }
    }

    fn finalize(&mut self, markdown: &str) {
        self.erase();
        let rendered = render_markdown(self.skin, markdown, self.width);
        self.write(&rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use futures::stream;

    #[derive(Default)]
    struct RecordingRegion {
        updates: Vec<String>,
        finalized: Option<String>,
    }

    impl LiveRegion for RecordingRegion {
        fn update(&mut self, markdown: &str) {
            self.updates.push(markdown.to_string());
        }

        fn finalize(&mut self, markdown: &str) {
            assert!(self.finalized.is_none(), "finalized twice");
            self.finalized = Some(markdown.to_string());
        }
    }

    fn fragments(parts: &[&str]) -> FragmentStream {
        FragmentStream::from_fragments(
            parts.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_fragments_are_coalesced() {
        let mut region = RecordingRegion::default();
        let mut limiter = RefreshLimiter::default();
        let mut stream = fragments(&["Hello", " ", "World"]);

        let text = render_stream(&mut stream, &mut region, &mut limiter).await;

        assert_eq!(text, "Hello World");
        assert_eq!(region.updates, vec!["Hello"]);
        assert_eq!(region.finalized.as_deref(), Some("Hello World"));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_redraw_flushes_when_interval_elapses() {
        let delays = vec![("a", 0u64), ("b", 10), ("c", 490)];
        let inner = stream::iter(delays).then(|(text, delay)| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            text.to_string()
        });
        let mut stream = FragmentStream::from_chunks(
            async move {
                Ok(Box::pin(inner.map(|text| {
                    Ok(crate::types::ChatCompletionChunk::from_content(Some(&text)))
                })))
            },
            std::sync::Arc::new(crate::diagnostics::MemoryDiagnostics::default()),
        );
        let mut region = RecordingRegion::default();
        let mut limiter = RefreshLimiter::new(15);

        let text = render_stream(&mut stream, &mut region, &mut limiter).await;

        assert_eq!(text, "abc");
        assert_eq!(region.updates, vec!["a", "ab", "abc"]);
        assert_eq!(region.finalized.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn unlimited_refresh_redraws_every_fragment() {
        let mut region = RecordingRegion::default();
        let mut limiter = RefreshLimiter::new(0);
        let mut stream = fragments(&["a", "b", "c"]);

        render_stream(&mut stream, &mut region, &mut limiter).await;

        assert_eq!(region.updates, vec!["a", "ab", "abc"]);
    }

    #[tokio::test]
    async fn empty_stream_still_finalizes() {
        let mut region = RecordingRegion::default();
        let mut limiter = RefreshLimiter::default();
        let mut stream = fragments(&[]);

        let text = render_stream(&mut stream, &mut region, &mut limiter).await;

        assert!(text.is_empty());
        assert!(region.updates.is_empty());
        assert_eq!(region.finalized.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn stream_failure_appends_note_after_partial_text() {
        let mut region = RecordingRegion::default();
        let mut limiter = RefreshLimiter::new(0);
        let mut stream = FragmentStream::truncated(
            vec!["Partial".to_string()],
            Error::streaming("connection reset", None),
        );

        let text = render_stream(&mut stream, &mut region, &mut limiter).await;

        assert_eq!(
            text,
            "Partial\n\n*Error occurred during streaming: Streaming error: connection reset*"
        );
        assert_eq!(region.updates, vec!["Partial"]);
        assert_eq!(region.finalized.as_deref(), Some(text.as_str()));
    }

    #[test]
    fn limiter_interval() {
        assert_eq!(RefreshLimiter::new(10).interval(), Duration::from_millis(100));
        assert_eq!(RefreshLimiter::new(0).interval(), Duration::ZERO);
    }

    #[tokio::test]
    async fn terminal_region_erases_previous_draw() {
        let skin = MadSkin::no_style();
        let mut out: Vec<u8> = Vec::new();
        {
            let mut region = TerminalLiveRegion::new(&mut out, &skin, 60).with_height(10);
            region.update("first");
            assert_eq!(region.lines_drawn(), 1);
            region.finalize("first\n\nsecond");
            assert_eq!(region.lines_drawn(), 0);
        }
        let written = String::from_utf8(out).unwrap();
        assert!(written.contains("first"));
        assert!(written.contains("second"));
        // ESC [ 1 F moves to the start of the previous line.
        assert!(written.contains("\x1b[1F"));
    }

    fn cursor_ups(written: &str) -> Vec<usize> {
        written
            .split("\x1b[")
            .skip(1)
            .filter_map(|escape| escape.split_once('F'))
            .filter_map(|(count, _)| count.parse().ok())
            .collect()
    }

    #[test]
    fn tall_redraws_are_cropped_to_height() {
        let skin = MadSkin::no_style();
        let body = (0..200)
            .map(|i| format!("paragraph {i}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut out: Vec<u8> = Vec::new();
        {
            let mut region = TerminalLiveRegion::new(&mut out, &skin, 60).with_height(5);
            region.update(&body);
            assert_eq!(region.lines_drawn(), 5);
            region.update(&format!("{body}\n\nparagraph 200"));
            assert_eq!(region.lines_drawn(), 5);
            region.finalize(&format!("{body}\n\nparagraph 200"));
        }
        let written = String::from_utf8(out).unwrap();
        let ups = cursor_ups(&written);
        assert_eq!(ups, vec![5, 5]);
        assert!(written.contains("…"));
        // The final draw is complete, including the cropped-away start.
        let last_draw = written.rsplit("\x1b[J").next().unwrap();
        assert!(last_draw.contains("paragraph 0"));
        assert!(last_draw.contains("paragraph 200"));
    }
}
