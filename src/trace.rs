//! Feature-gated tracing macros.
//!
//! With the `tracing` feature enabled these forward to `tracing` spans and
//! events; without it they compile away so the hot path carries no cost.

#[cfg(feature = "tracing")]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name $(, $($field)*)?)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_span {
    ($name:expr $(, $($field:tt)*)?) => {
        $crate::trace::NoopSpan
    };
}

#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::info!(name: $name, $($key = $value),+)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        // Evaluate the values so the disabled build keeps the same
        // unused-variable surface as the enabled one.
        let _ = ($($value,)+);
    };
}

pub(crate) use trace_event;
pub(crate) use trace_span;

/// Span guard stand-in so call sites can write
/// `let _span = trace_span!(..).entered();` under either feature setting.
#[cfg(not(feature = "tracing"))]
pub struct NoopSpan;

#[cfg(not(feature = "tracing"))]
impl NoopSpan {
    #[inline]
    pub fn entered(self) -> Self {
        self
    }
}
