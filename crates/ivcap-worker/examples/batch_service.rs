// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A batch service that stays busy for a while and reports how long it took.
//!
//! ```sh
//! cargo run --example batch_service -- --test-file crates/ivcap-worker/tests/fixtures/job.json
//! ```

use std::time::{Duration, Instant};

use anyhow::Context as _;
use ivcap_worker::{
	start_batch_service, worker_fn_with_context, JobContext, JobModel, Service, ServiceContact,
	ServiceLicense, WorkerError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Serialize, Deserialize)]
struct Request {
	/// Seconds to keep busy for.
	duration: f64,
}

impl JobModel for Request {
	const SCHEMA: &'static str = "urn:sd:schema.busy-worker.request.1";

	fn json_schema() -> Value {
		json!({
			"type": "object",
			"properties": {
				"$schema": {"type": "string", "const": Self::SCHEMA},
				"duration": {"type": "number", "description": "seconds to keep busy for"}
			},
			"required": ["duration"]
		})
	}
}

#[derive(Debug, Serialize, Deserialize)]
struct Report {
	message: String,
	run_time: f64,
}

impl JobModel for Report {
	const SCHEMA: &'static str = "urn:sd:schema.busy-worker.report.1";
}

async fn busy(req: Request, ctx: JobContext, max_duration: f64) -> Result<Report, WorkerError> {
	if !(0.0..=max_duration).contains(&req.duration) {
		return Err(WorkerError::new(
			"ValueError",
			format!("duration {} is out of range", req.duration),
		));
	}

	let started = Instant::now();
	ctx.report()
		.run_step("busy", async {
			tokio::time::sleep(Duration::from_secs_f64(req.duration)).await;
			Ok::<_, WorkerError>(())
		})
		.await?;

	Ok(Report {
		message: format!("job {} kept busy", ctx.job_id()),
		run_time: started.elapsed().as_secs_f64(),
	})
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let contact = ServiceContact {
		name: std::env::var("CONTACT_NAME").unwrap_or_else(|_| "Mary Doe".to_string()),
		email: std::env::var("CONTACT_EMAIL").unwrap_or_else(|_| "mary.doe@example.com".to_string()),
		url: None,
	};
	let max_duration: f64 = std::env::var("MAX_DURATION")
		.ok()
		.map(|v| v.parse::<f64>())
		.transpose()
		.context("MAX_DURATION must be a number of seconds")?
		.unwrap_or(600.0);

	let service = Service::new("Busy Worker", contact)
		.description(
			"Stays busy for the requested number of seconds.\n\n\
			 Useful for exercising the batch job pipeline end to end.",
		)
		.license(ServiceLicense {
			name: "MIT".to_string(),
			url: "https://opensource.org/license/MIT".to_string(),
		});

	let worker = worker_fn_with_context("busy", move |req: Request, ctx: JobContext| {
		busy(req, ctx, max_duration)
	});
	start_batch_service(service, worker).await;
	Ok(())
}
