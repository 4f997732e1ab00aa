// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The fetch, execute, push cycle.

use ivcap_worker_core::{verify_result, ExecutionError, Job, JobResult};
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::TransportError;
use crate::executor::JobExecutor;
use crate::transport::JobTransport;
use crate::worker::Worker;

/// Process exit code when the sidecar cannot be reached.
pub const FETCH_EXHAUSTED_EXIT_CODE: i32 = 255;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
	/// The sidecar signalled that the batch is done.
	BatchDone,
	/// No sidecar is configured, so there is no work to fetch.
	Standalone,
	/// Fetching the next job failed on every attempt.
	FetchExhausted,
}

impl LoopExit {
	pub fn exit_code(self) -> i32 {
		match self {
			LoopExit::BatchDone | LoopExit::Standalone => 0,
			LoopExit::FetchExhausted => FETCH_EXHAUSTED_EXIT_CODE,
		}
	}
}

pub struct WorkerLoop<W, T> {
	executor: JobExecutor<W>,
	transport: T,
}

impl<W: Worker, T: JobTransport> WorkerLoop<W, T> {
	pub fn new(executor: JobExecutor<W>, transport: T) -> Self {
		Self {
			executor,
			transport,
		}
	}

	/// Processes jobs one at a time until the batch is done or the sidecar
	/// is gone. A job that fails, even by panicking, never stops the loop.
	pub async fn run(&self) -> LoopExit {
		info!(worker = %self.executor.worker().name(), "starting worker loop");
		loop {
			let fetched = match self.transport.fetch_job().await {
				Ok(fetched) => fetched,
				Err(TransportError::NotConfigured) => {
					warn!("no sidecar base URL configured, not requesting work");
					return LoopExit::Standalone;
				}
				Err(err) => {
					error!(error = %err, "cannot fetch next job, bailing out");
					return LoopExit::FetchExhausted;
				}
			};

			if Job::is_batch_done_body(&fetched.body) {
				info!("no more jobs, batch is done");
				return LoopExit::BatchDone;
			}

			let job = match Job::from_slice(&fetched.body, fetched.authorization.clone()) {
				Ok(job) => job,
				Err(err) => {
					let job_id = Job::salvage_id(&fetched.body);
					warn!(job_id = %job_id, error = %err, "cannot decode job envelope");
					let result = JobResult::Failure(ExecutionError::from_error(&err));
					self.deliver(&job_id, result, fetched.authorization.as_deref())
						.await;
					continue;
				}
			};

			let span = info_span!("job", job_id = %job.id);
			self.process(job).instrument(span).await;
		}
	}

	async fn process(&self, job: Job) {
		info!(schema = %job.schema, "processing job");
		let outcome = self.executor.run(&job).await;
		let result = verify_result(outcome, &job.id);
		info!(is_error = result.is_error(), content_type = %result.content_type(), "job finished");
		self.deliver(&job.id, result, job.authorization.as_deref())
			.await;
	}

	async fn deliver(&self, job_id: &str, result: JobResult, authorization: Option<&str>) {
		if let Err(err) = self
			.transport
			.push_result(job_id, result, authorization)
			.await
		{
			warn!(job_id = %job_id, error = %err, "giving up on delivering result");
		}
	}
}
