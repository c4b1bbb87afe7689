//! Lazy sequences of streamed text fragments.
//!
//! A [`FragmentStream`] yields only text.  When the provider fails mid-way the
//! stream simply ends; the failure is recorded in an out-of-band slot that the
//! consumer may inspect with [`FragmentStream::last_error`] once it is done.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use crate::Error;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::observability::{STREAM_ERRORS, STREAM_FRAGMENTS};
use crate::types::ChatCompletionChunk;

/// State shared between a fragment stream and its consumer.
#[derive(Default)]
struct Shared {
    last_error: Mutex<Option<Error>>,
    deferred: AtomicBool,
    unreported: AtomicBool,
}

impl Shared {
    fn store(&self, err: Error) {
        match self.last_error.lock() {
            Ok(mut guard) => *guard = Some(err),
            Err(poisoned) => *poisoned.into_inner() = Some(err),
        }
    }

    fn load(&self) -> Option<Error> {
        match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// A finite, forward-only stream of response fragments.
pub struct FragmentStream {
    inner: Pin<Box<dyn Stream<Item = String> + Send>>,
    shared: Arc<Shared>,
    diagnostics: Option<Arc<dyn Diagnostics>>,
}

impl FragmentStream {
    /// Creates a stream that yields `fragments` and then ends cleanly.
    ///
    /// ```
    /// # use futures::StreamExt;
    /// # use mindterm::FragmentStream;
    /// # tokio_test::block_on(async {
    /// let fragments = FragmentStream::from_fragments(vec!["Hello".to_string(), " World".to_string()]);
    /// let text = fragments.collect::<Vec<_>>().await.concat();
    /// assert_eq!(text, "Hello World");
    /// # });
    /// ```
    pub fn from_fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        Self {
            inner: Box::pin(stream::iter(fragments)),
            shared: Arc::new(Shared::default()),
            diagnostics: None,
        }
    }

    /// Creates a stream that yields `fragments` and then ends as if the
    /// provider had failed with `error`.
    pub fn truncated<I>(fragments: I, error: Error) -> Self
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let slot = Arc::clone(&shared);
        let marker = stream::once(async move {
            slot.store(error);
        })
        .filter_map(|()| async { None::<String> });
        let inner = stream::iter(fragments).chain(marker);
        Self {
            inner: Box::pin(inner),
            shared,
            diagnostics: None,
        }
    }

    /// Adapts a pending chunk stream into a fragment stream.
    ///
    /// `connect` is not polled until the first fragment is requested.  Chunks
    /// without text are skipped.  The first error, whether from `connect` or
    /// from the chunk stream, is stored in the error slot, ends the stream, and
    /// is reported to `diagnostics` (immediately, unless the consumer asked
    /// for [`FragmentStream::defer_diagnostics`]).
    pub fn from_chunks<F, S>(connect: F, diagnostics: Arc<dyn Diagnostics>) -> Self
    where
        F: Future<Output = Result<S>> + Send + 'static,
        S: Stream<Item = Result<ChatCompletionChunk>> + Send + Unpin + 'static,
    {
        enum State<F, S> {
            Connecting(F),
            Streaming(S),
        }

        let shared = Arc::new(Shared::default());
        let state = Arc::clone(&shared);
        let sink = Arc::clone(&diagnostics);

        let inner = stream::unfold(State::Connecting(connect), move |progress| {
            let shared = Arc::clone(&state);
            let diagnostics = Arc::clone(&sink);
            async move {
                let mut chunks = match progress {
                    State::Connecting(connect) => match connect.await {
                        Ok(chunks) => chunks,
                        Err(err) => {
                            fail(&shared, diagnostics.as_ref(), err);
                            return None;
                        }
                    },
                    State::Streaming(chunks) => chunks,
                };
                loop {
                    match chunks.next().await {
                        Some(Ok(chunk)) => {
                            if let Some(fragment) = chunk.fragment() {
                                STREAM_FRAGMENTS.click();
                                let fragment = fragment.to_string();
                                return Some((fragment, State::Streaming(chunks)));
                            }
                        }
                        Some(Err(err)) => {
                            fail(&shared, diagnostics.as_ref(), err);
                            return None;
                        }
                        None => return None,
                    }
                }
            }
        });

        Self {
            inner: Box::pin(inner),
            shared,
            diagnostics: Some(diagnostics),
        }
    }

    /// The failure that ended this stream early, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.shared.load()
    }

    /// Holds back the failure diagnostic until [`report_deferred`] is called.
    ///
    /// A consumer that owns the terminal while it draws calls this before
    /// polling, so the diagnostic is not written into the middle of its
    /// output.
    ///
    /// [`report_deferred`]: FragmentStream::report_deferred
    pub fn defer_diagnostics(&self) {
        self.shared.deferred.store(true, Ordering::SeqCst);
    }

    /// Reports a failure held back by [`defer_diagnostics`].
    ///
    /// Returns true if a diagnostic was emitted.  A failure is reported at
    /// most once.
    ///
    /// [`defer_diagnostics`]: FragmentStream::defer_diagnostics
    pub fn report_deferred(&self) -> bool {
        if !self.shared.unreported.swap(false, Ordering::SeqCst) {
            return false;
        }
        match (&self.diagnostics, self.last_error()) {
            (Some(diagnostics), Some(err)) => {
                diagnostics.report(&completion_failure(&err));
                true
            }
            _ => false,
        }
    }
}

impl Stream for FragmentStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.inner.as_mut().poll_next(cx)
    }
}

fn completion_failure(err: &Error) -> String {
    format!("Error getting completion: {err}")
}

fn fail(shared: &Shared, diagnostics: &dyn Diagnostics, err: Error) {
    STREAM_ERRORS.click();
    debug!(error = %err, "completion stream ended early");
    let message = completion_failure(&err);
    shared.store(err);
    if shared.deferred.load(Ordering::SeqCst) {
        shared.unreported.store(true, Ordering::SeqCst);
    } else {
        diagnostics.report(&message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemoryDiagnostics;

    fn chunk(content: Option<&str>) -> Result<ChatCompletionChunk> {
        Ok(ChatCompletionChunk::from_content(content))
    }

    fn failing_stream(diagnostics: &Arc<MemoryDiagnostics>) -> FragmentStream {
        let chunks = stream::iter(vec![
            chunk(Some("partial")),
            Err(Error::streaming("connection reset", None)),
        ]);
        FragmentStream::from_chunks(
            async move { Ok(chunks) },
            diagnostics.clone() as Arc<dyn Diagnostics>,
        )
    }

    #[tokio::test]
    async fn skips_chunks_without_content() {
        let diagnostics = Arc::new(MemoryDiagnostics::default());
        let chunks = stream::iter(vec![chunk(Some("Hello")), chunk(Some(" World")), chunk(None)]);
        let fragments = FragmentStream::from_chunks(
            async move { Ok(chunks) },
            diagnostics.clone() as Arc<dyn Diagnostics>,
        );

        let collected: Vec<String> = fragments.collect().await;
        assert_eq!(collected, vec!["Hello", " World"]);
        assert!(diagnostics.messages().is_empty());
    }

    #[tokio::test]
    async fn error_mid_stream_ends_sequence() {
        let diagnostics = Arc::new(MemoryDiagnostics::default());
        let chunks = stream::iter(vec![
            chunk(Some("partial")),
            Err(Error::streaming("connection reset", None)),
            chunk(Some("never")),
        ]);
        let mut fragments = FragmentStream::from_chunks(
            async move { Ok(chunks) },
            diagnostics.clone() as Arc<dyn Diagnostics>,
        );

        assert_eq!(fragments.next().await.as_deref(), Some("partial"));
        assert_eq!(fragments.next().await, None);
        assert!(fragments.last_error().is_some_and(|e| e.is_streaming()));
        assert_eq!(diagnostics.messages().len(), 1);
        assert!(diagnostics.messages()[0].starts_with("Error getting completion:"));
        assert!(!fragments.report_deferred());
        assert_eq!(diagnostics.messages().len(), 1);
    }

    #[tokio::test]
    async fn deferred_failure_is_reported_once_on_request() {
        let diagnostics = Arc::new(MemoryDiagnostics::default());
        let mut fragments = failing_stream(&diagnostics);
        fragments.defer_diagnostics();

        assert_eq!(fragments.next().await.as_deref(), Some("partial"));
        assert_eq!(fragments.next().await, None);
        assert!(fragments.last_error().is_some());
        assert!(diagnostics.messages().is_empty());

        assert!(fragments.report_deferred());
        assert!(!fragments.report_deferred());
        let messages = diagnostics.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("connection reset"));
    }

    #[tokio::test]
    async fn deferring_a_clean_stream_reports_nothing() {
        let diagnostics = Arc::new(MemoryDiagnostics::default());
        let chunks = stream::iter(vec![chunk(Some("fine"))]);
        let mut fragments = FragmentStream::from_chunks(
            async move { Ok(chunks) },
            diagnostics.clone() as Arc<dyn Diagnostics>,
        );
        fragments.defer_diagnostics();

        while fragments.next().await.is_some() {}
        assert!(!fragments.report_deferred());
        assert!(diagnostics.messages().is_empty());
    }

    #[tokio::test]
    async fn connect_failure_yields_nothing() {
        let diagnostics = Arc::new(MemoryDiagnostics::default());
        let fragments = FragmentStream::from_chunks(
            async {
                Err::<stream::Iter<std::vec::IntoIter<Result<ChatCompletionChunk>>>, _>(
                    Error::connection("refused", None),
                )
            },
            diagnostics.clone() as Arc<dyn Diagnostics>,
        );

        let shared = Arc::clone(&fragments.shared);
        let collected: Vec<String> = fragments.collect().await;
        assert!(collected.is_empty());
        assert!(shared.load().is_some_and(|e| e.is_connection()));
        assert_eq!(diagnostics.messages().len(), 1);
    }

    #[tokio::test]
    async fn connect_is_lazy() {
        let diagnostics: Arc<dyn Diagnostics> = Arc::new(MemoryDiagnostics::default());
        let polled = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&polled);
        let fragments = FragmentStream::from_chunks(
            async move {
                *flag.lock().unwrap() = true;
                Ok(stream::iter(Vec::<Result<ChatCompletionChunk>>::new()))
            },
            diagnostics,
        );
        assert!(!*polled.lock().unwrap());
        drop(fragments);
        assert!(!*polled.lock().unwrap());
    }

    #[tokio::test]
    async fn truncated_records_error_after_fragments() {
        let mut fragments =
            FragmentStream::truncated(vec!["a".to_string()], Error::streaming("cut", None));
        assert!(fragments.last_error().is_none());
        assert_eq!(fragments.next().await.as_deref(), Some("a"));
        assert_eq!(fragments.next().await, None);
        assert!(fragments.last_error().is_some());
    }
}
