//! Thin re-export layer over `tracing`, kept as its own module (as the
//! teacher does) so instrumentation call sites read `trace!`/`debug!`
//! without an explicit `tracing::` prefix everywhere.

pub(crate) use tracing::{debug, error, info, trace, warn};
pub(crate) use tracing::{debug_span, error_span, info_span, trace_span, warn_span};
