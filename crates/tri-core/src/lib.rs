// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod error;

pub use error::{RenderError, RenderResult, Stage, StageExt};

/// Installs the process-wide fmt subscriber. `RUST_LOG` wins; otherwise `info`.
/// Output goes to stderr so setup failures land where the shell expects them.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
