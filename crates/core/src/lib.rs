//! Client core for murmur.
//!
//! Everything that is not presentation lives here: the session/identity
//! provider, the file-storage helper, the like/follow reconciler, the
//! feed/profile/search fetchers, the post composer and the notification
//! inbox. [`App`] wires the services over one backend handle.

pub mod app;
pub mod services;

pub use app::App;
pub use services::*;

/// Initialize tracing for binaries and examples embedding the client core.
///
/// Honors `RUST_LOG`; defaults to debug-level output for the workspace
/// crates.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug".into()),
        )
        .init();
}
