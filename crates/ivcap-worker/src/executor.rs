// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runs a single job through the registered worker.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
pub use ivcap_worker_core::PANIC_ERROR_KIND;
use ivcap_worker_core::{ExecutionError, IntoOutcome, Job, Outcome};
use tracing::{info, warn};

use crate::backtrace::format_panic_traceback;
use crate::context::{JobContext, OutboundPolicy};
use crate::events::{EventReporter, EventSink, TracingSink};
use crate::panic_capture::{self, extract_panic_message};
use crate::worker::{Worker, WorkerError};

/// Type tag of jobs whose input is not JSON.
pub const UNSUPPORTED_CONTENT_TYPE_KIND: &str = "UnsupportedContentType";

pub struct JobExecutor<W> {
	worker: W,
	sink: Arc<dyn EventSink>,
	outbound: OutboundPolicy,
}

impl<W: Worker> JobExecutor<W> {
	pub fn new(worker: W) -> Self {
		Self {
			worker,
			sink: Arc::new(TracingSink),
			outbound: OutboundPolicy::default(),
		}
	}

	pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
		self.sink = sink;
		self
	}

	pub fn with_outbound(mut self, outbound: OutboundPolicy) -> Self {
		self.outbound = outbound;
		self
	}

	pub fn worker(&self) -> &W {
		&self.worker
	}

	/// Decodes the job's input, calls the worker and captures whatever it
	/// produced. Never fails: every error and panic becomes
	/// [`Outcome::Failure`].
	pub async fn run(&self, job: &Job) -> Outcome {
		if !job.is_json() {
			warn!(job_id = %job.id, content_type = %job.content_type, "unsupported input content type");
			return Outcome::Failure(ExecutionError::new(
				UNSUPPORTED_CONTENT_TYPE_KIND,
				format!(
					"{}: cannot handle content-type '{}'",
					job.id, job.content_type
				),
			));
		}

		let request: W::Request = match serde_json::from_value(job.content.clone()) {
			Ok(request) => request,
			Err(err) => {
				warn!(job_id = %job.id, error = %err, "cannot decode job input");
				return Outcome::Failure(WorkerError::from(err).into_execution_error());
			}
		};

		let ctx = self.context_for(job);
		info!(job_id = %job.id, worker = %self.worker.name(), "calling worker");

		let call = panic_capture::capture(self.worker.call(request, ctx));
		let outcome = match AssertUnwindSafe(call).catch_unwind().await {
			Ok(Ok(output)) => output.into_outcome(),
			Ok(Err(err)) => {
				warn!(job_id = %job.id, error = %err, "worker failed");
				Outcome::Failure(err.into_execution_error())
			}
			Err(payload) => {
				let captured = panic_capture::take_last();
				let message = captured
					.as_ref()
					.map(|c| c.message.clone())
					.unwrap_or_else(|| extract_panic_message(&*payload));
				warn!(job_id = %job.id, panic = %message, "worker panicked");
				let traceback = format_panic_traceback(
					&message,
					captured.as_ref().and_then(|c| c.location.as_deref()),
					captured.as_ref().map(|c| &c.backtrace),
				);
				Outcome::Failure(
					ExecutionError::new(PANIC_ERROR_KIND, message).with_traceback(traceback),
				)
			}
		};

		self.check_declared_output(job, &outcome);
		info!(job_id = %job.id, kind = outcome.kind(), "worker finished");
		outcome
	}

	fn context_for(&self, job: &Job) -> JobContext {
		let report = EventReporter::new(job.id.clone(), job.authorization.clone(), self.sink.clone());
		JobContext::new(
			job.id.clone(),
			job.authorization.clone(),
			report,
			self.outbound.clone(),
		)
	}

	fn check_declared_output(&self, job: &Job, outcome: &Outcome) {
		let Some(expected) = self.worker.declared_output_schema() else {
			return;
		};
		if outcome.is_failure() || outcome.schema() == Some(expected) {
			return;
		}
		let actual = outcome.schema().unwrap_or(outcome.kind());
		warn!(
			job_id = %job.id,
			expected = %expected,
			actual = %actual,
			"result is of type '{actual}' but expected '{expected}'"
		);
	}
}
