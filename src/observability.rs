use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("mindterm.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("mindterm.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("mindterm.client.request_duration_seconds");

pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("mindterm.stream.fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("mindterm.stream.errors");

pub(crate) static REPL_TURNS: Counter = Counter::new("mindterm.repl.turns");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);

    collector.register_counter(&REPL_TURNS);
}
