//! Runs in its own process because `init` installs the global tracing subscriber.

use cockpit_bridge::logging::{init, TracingConfig};

#[test]
fn test_init_is_idempotent() {
    let plain = TracingConfig {
        with_ansi: false,
        ..TracingConfig::default()
    };
    assert!(init(plain).is_ok());
    assert!(init(TracingConfig::default()).is_ok());
}
