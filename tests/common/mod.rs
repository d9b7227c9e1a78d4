use std::sync::Once;

static INIT: Once = Once::new();

/// Wire up a dev-only `tracing` subscriber so test output is visible with
/// `RUST_LOG=vc_supervisor=debug cargo test -- --nocapture`. Mirrors the
/// "no subscriber installed inside the library itself" design note: only
/// tests reach for `tracing-subscriber`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
