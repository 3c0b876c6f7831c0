use biometrics::{Collector, Counter, Moments};

pub(crate) static CONNECT_ATTEMPTS: Counter = Counter::new("chatlink.connection.connect_attempts");
pub(crate) static LIVE_CONNECTS: Counter = Counter::new("chatlink.connection.live_connects");
pub(crate) static DOWNGRADES: Counter = Counter::new("chatlink.connection.downgrades");
pub(crate) static CONNECT_DURATION: Moments =
    Moments::new("chatlink.connection.connect_duration_seconds");

pub(crate) static SENDS: Counter = Counter::new("chatlink.connection.sends");
pub(crate) static SEND_FAILURES: Counter = Counter::new("chatlink.connection.send_failures");
pub(crate) static STALE_RESULTS: Counter = Counter::new("chatlink.connection.stale_results");
pub(crate) static PROTOCOL_ERRORS: Counter = Counter::new("chatlink.connection.protocol_errors");
pub(crate) static FALLBACK_REQUEST_DURATION: Moments =
    Moments::new("chatlink.fallback.request_duration_seconds");

pub(crate) static SESSION_OPENS: Counter = Counter::new("chatlink.session.opens");
pub(crate) static SESSION_REJECTED_SUBMITS: Counter =
    Counter::new("chatlink.session.rejected_submits");
pub(crate) static SESSION_REPLY_TIMEOUTS: Counter = Counter::new("chatlink.session.reply_timeouts");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CONNECT_ATTEMPTS);
    collector.register_counter(&LIVE_CONNECTS);
    collector.register_counter(&DOWNGRADES);
    collector.register_moments(&CONNECT_DURATION);

    collector.register_counter(&SENDS);
    collector.register_counter(&SEND_FAILURES);
    collector.register_counter(&STALE_RESULTS);
    collector.register_counter(&PROTOCOL_ERRORS);
    collector.register_moments(&FALLBACK_REQUEST_DURATION);

    collector.register_counter(&SESSION_OPENS);
    collector.register_counter(&SESSION_REJECTED_SUBMITS);
    collector.register_counter(&SESSION_REPLY_TIMEOUTS);
}
