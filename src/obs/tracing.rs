// self
use crate::{
	_prelude::*,
	obs::{OperationKind, record_retry_metric},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOperation<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOperation<F> = F;

/// A span builder used by client operations.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OperationKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("mimecast_client.operation", operation = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOperation<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a retry event and bumps the retry counter.
///
/// `attempt` is the 1-based attempt that just failed; `delay` is the wait before the next one.
pub fn record_retry(
	kind: OperationKind,
	reason: &'static str,
	attempt: u32,
	delay: std::time::Duration,
) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			operation = kind.as_str(),
			reason,
			attempt,
			delay_ms = delay.as_millis() as u64,
			"retrying after transient failure"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, delay);
	}

	record_retry_metric(kind, reason);
}

/// Emits a debug event when a request waits for rate-limit quota.
pub fn record_rate_limit_wait(delay: std::time::Duration, authoritative: bool) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			delay_ms = delay.as_millis() as u64,
			authoritative,
			"waiting for rate-limit quota"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (delay, authoritative);
	}
}
