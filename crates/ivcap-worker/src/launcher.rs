// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Command line entry point for batch services.

use std::path::{Path, PathBuf};

use clap::Parser;
use futures::StreamExt;
use ivcap_worker_core::{verify_result, Job, JobDecodeError, JobResult, ResultContent, JSON_CONTENT_TYPE};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use crate::config::{ConfigError, WorkerConfig};
use crate::context::OutboundPolicy;
use crate::error::TransportError;
use crate::executor::JobExecutor;
use crate::logging::{self, LogFormat};
use crate::service::{create_batch_service_definition, DescriptorSettings, Service, ServiceError};
use crate::tool::create_tool_definition;
use crate::transport::SidecarClient;
use crate::worker::Worker;
use crate::worker_loop::WorkerLoop;

/// Exit code for launcher failures.
pub const LAUNCH_ERROR_EXIT_CODE: i32 = 1;

#[derive(Error, Debug)]
pub enum LaunchError {
	#[error("cannot read job file '{}': {source}", .path.display())]
	ReadJobFile {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid job file: {0}")]
	InvalidJob(#[from] JobDecodeError),

	#[error("cannot write result: {0}")]
	Output(#[from] std::io::Error),

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Service(#[from] ServiceError),

	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error("cannot serialize descriptor: {0}")]
	Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LaunchError>;

#[derive(Parser, Debug, Clone, Default)]
#[command(about = "IVCAP batch service")]
pub struct ServiceArgs {
	/// Print the service description to stdout and exit
	#[arg(long)]
	pub print_service_description: bool,

	/// Print the tool description to stdout and exit
	#[arg(long)]
	pub print_tool_description: bool,

	/// Run a single job from a file and print its result
	#[arg(long, value_name = "PATH")]
	pub test_file: Option<PathBuf>,

	/// Sidecar base URL
	#[arg(long, env = "IVCAP_BASE_URL")]
	pub base_url: Option<String>,

	/// Log output format
	#[arg(long, env = "IVCAP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
	pub log_format: LogFormat,
}

/// Parses the command line, runs the service and exits the process.
pub async fn start_batch_service<W: Worker>(service: Service, worker: W) {
	let args = ServiceArgs::parse();
	logging::init(args.log_format);

	let code = match run_batch_service(service, worker, args, &mut tokio::io::stdout()).await {
		Ok(code) => code,
		Err(err) => {
			error!(error = %err, "batch service failed");
			LAUNCH_ERROR_EXIT_CODE
		}
	};
	std::process::exit(code)
}

/// Does whatever `args` ask for and returns the process exit code.
/// Descriptors and test-file results are written to `out`.
pub async fn run_batch_service<W, O>(
	service: Service,
	worker: W,
	args: ServiceArgs,
	out: &mut O,
) -> Result<i32>
where
	W: Worker,
	O: AsyncWrite + Unpin,
{
	if args.print_service_description {
		let definition = create_batch_service_definition(&service, &DescriptorSettings::from_env())?;
		write_line(out, &definition.to_json_pretty()?).await?;
		return Ok(0);
	}

	if args.print_tool_description {
		let tool = create_tool_definition(&worker, &service, &DescriptorSettings::from_env());
		write_line(out, &tool.to_json_pretty()?).await?;
		return Ok(0);
	}

	let mut config = WorkerConfig::from_env()?;
	if let Some(base_url) = &args.base_url {
		config = config.with_base_url(base_url)?;
	}

	info!(
		service = %service.name,
		version = %service.version,
		sdk = env!("CARGO_PKG_VERSION"),
		"starting batch service"
	);

	let executor = JobExecutor::new(worker).with_outbound(OutboundPolicy::new(config.proxy_url.clone()));

	if let Some(path) = &args.test_file {
		run_test_file(&executor, path, out).await?;
		return Ok(0);
	}

	let transport = SidecarClient::new(&config)?;
	let exit = WorkerLoop::new(executor, transport).run().await;
	info!(exit = ?exit, "worker loop stopped");
	Ok(exit.exit_code())
}

/// Runs the job in `path` through the executor and normalizer, without any
/// transport, and writes the result to `out`.
pub async fn run_test_file<W, O>(executor: &JobExecutor<W>, path: &Path, out: &mut O) -> Result<JobResult>
where
	W: Worker,
	O: AsyncWrite + Unpin,
{
	let body = tokio::fs::read(path)
		.await
		.map_err(|source| LaunchError::ReadJobFile {
			path: path.to_path_buf(),
			source,
		})?;
	let job = Job::from_slice(&body, None)?;

	let outcome = executor.run(&job).await;
	let result = verify_result(outcome, &job.id);
	info!(job_id = %job.id, is_error = result.is_error(), "test job finished");
	write_result(out, result).await
}

/// Writes a result for a human: JSON pretty-printed, everything else raw.
/// Returns the result with streamed content replaced by what was written.
async fn write_result<O>(out: &mut O, result: JobResult) -> Result<JobResult>
where
	O: AsyncWrite + Unpin,
{
	match result {
		JobResult::Failure(err) => {
			write_line(out, &serde_json::to_string_pretty(&err)?).await?;
			Ok(JobResult::Failure(err))
		}
		JobResult::Success(mut success) => {
			match &mut success.content {
				ResultContent::Bytes(bytes) if success.content_type == JSON_CONTENT_TYPE => {
					let value: serde_json::Value = serde_json::from_slice(bytes)?;
					write_line(out, &serde_json::to_string_pretty(&value)?).await?;
				}
				ResultContent::Bytes(bytes) => {
					out.write_all(bytes).await?;
					out.flush().await?;
				}
				ResultContent::Stream(stream) => {
					let mut written = Vec::new();
					while let Some(chunk) = stream.next().await {
						let chunk = chunk?;
						out.write_all(&chunk).await?;
						written.extend_from_slice(&chunk);
					}
					out.flush().await?;
					success.content = ResultContent::Bytes(written.into());
				}
			}
			Ok(JobResult::Success(success))
		}
	}
}

async fn write_line<O>(out: &mut O, text: &str) -> Result<()>
where
	O: AsyncWrite + Unpin,
{
	out.write_all(text.as_bytes()).await?;
	out.write_all(b"\n").await?;
	out.flush().await?;
	Ok(())
}
