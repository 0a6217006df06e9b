//! Logging hooks for the search pipeline.
//!
//! With the `tracing` feature the macros below forward to `tracing`; without
//! it they expand to nothing but still evaluate their field values, so call
//! sites need no `cfg`. Spans wrap the long-running stages (`dispatch`,
//! `worker_pool`, `batch`, `aggregate`). Info events carry counts
//! (`mask_built`, `batches_dispatched`, `batch_done`, `job_ready`,
//! `aggregated`, `cleanup`). Warnings report faults that were skipped, such
//! as empty masks, corrupt targets, failed dispatches or missing batches.
//!
//! Field values must implement `tracing::Value`; pass `&str`, integers,
//! floats or bools.

/// Opens an info span around a pipeline stage. Call `.entered()` on the
/// result and keep the guard alive for the stage.
#[cfg(feature = "tracing")]
macro_rules! trace_span {
    ($stage:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($stage $(, $($field)*)?)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_span {
    ($stage:expr $(, $($field:tt)*)?) => {
        $crate::trace::StageGuard
    };
}

/// Records a named info event with counters.
#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($event:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::info!(name: $event, $($key = $value),+)
    };
    ($event:expr) => {
        tracing::info!(name: $event)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($event:expr, $($key:ident = $value:expr),+ $(,)?) => {
        let _ = ($($value,)+);
    };
    ($event:expr) => {};
}

/// Records a skipped fault at warn level.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($msg:literal, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::warn!($($key = $value),+, $msg)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($msg:literal, $($key:ident = $value:expr),+ $(,)?) => {
        let _ = ($($value,)+);
    };
}

pub(crate) use trace_event;
pub(crate) use trace_span;
pub(crate) use trace_warn;

/// Stand-in for an entered stage span when `tracing` is off.
#[cfg(not(feature = "tracing"))]
pub struct StageGuard;

#[cfg(not(feature = "tracing"))]
impl StageGuard {
    #[inline]
    pub fn entered(self) -> Self {
        self
    }
}
