use tracing_subscriber::EnvFilter;

/// Installs the process-wide `tracing` subscriber, reading `LOG_LEVEL` (§6)
/// and falling back to `info`. Grounded on `bins/server/src/main.rs`'s
/// `tracing_subscriber::fmt().with_env_filter(...)` startup sequence — the
/// one difference is the env var name, since `RUST_LOG` is not part of the
/// enumerated config surface (§6 only names `LOG_LEVEL`).
///
/// Call this once, before `Runner::run_multi`. The embedding binary (out of
/// scope here, §1) owns `main()` and decides whether to call it at all; the
/// runner itself never installs a subscriber implicitly.
pub fn init() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
