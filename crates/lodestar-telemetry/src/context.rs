//! Command span carried by every log line the binary emits.

use tracing::span::EnteredSpan;

use crate::init::build_sha;

/// Keeps the `lodestar` span entered until dropped.
///
/// Hold it for the whole command so refresh, repair, and hook logs are all
/// tagged with the running command and build.
#[must_use = "the span is exited when the guard is dropped"]
pub struct CommandSpan {
    _entered: EnteredSpan,
}

impl CommandSpan {
    /// Enter a span named `lodestar` carrying `command` and the recorded build.
    pub fn enter(command: &str) -> Self {
        let span = tracing::info_span!("lodestar", command, build = %build_sha());
        Self {
            _entered: span.entered(),
        }
    }
}
