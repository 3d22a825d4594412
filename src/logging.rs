//! Diagnostic logging.
//!
//! Logs go to stderr through `tracing-subscriber`; stdout is reserved for
//! command output. The filter comes from `RUST_LOG` when set, otherwise
//! `rowdex=info` (or `rowdex=debug` with `--verbose`).

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let default = if verbose { "rowdex=debug,rowdex_core=debug" } else { "rowdex=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
