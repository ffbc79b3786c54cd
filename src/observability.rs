use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("codetutor.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("codetutor.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("codetutor.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("codetutor.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("codetutor.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("codetutor.stream.bytes");
pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("codetutor.stream.fragments");
pub(crate) static STREAM_DURATION: Moments = Moments::new("codetutor.stream.duration_seconds");

pub(crate) static RETRIEVAL_REQUESTS: Counter = Counter::new("codetutor.retrieval.requests");
pub(crate) static RETRIEVAL_ERRORS: Counter = Counter::new("codetutor.retrieval.errors");
pub(crate) static RETRIEVAL_EMPTY: Counter = Counter::new("codetutor.retrieval.empty");

pub(crate) static SESSION_TURNS: Counter = Counter::new("codetutor.session.turns");
pub(crate) static SESSIONS_CREATED: Counter = Counter::new("codetutor.session.created");
pub(crate) static SESSIONS_ENDED: Counter = Counter::new("codetutor.session.ended");
pub(crate) static INTERACTION_FAILURES: Counter =
    Counter::new("codetutor.orchestrator.interaction_failures");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&RETRIEVAL_REQUESTS);
    collector.register_counter(&RETRIEVAL_ERRORS);
    collector.register_counter(&RETRIEVAL_EMPTY);

    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSIONS_CREATED);
    collector.register_counter(&SESSIONS_ENDED);
    collector.register_counter(&INTERACTION_FAILURES);
}
