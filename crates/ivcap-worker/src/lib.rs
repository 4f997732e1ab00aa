// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Batch job worker SDK for IVCAP.
//!
//! A batch service registers one async worker function and hands it to
//! [`start_batch_service`]. The SDK then pulls jobs from the sidecar one at a
//! time, runs the worker, normalizes whatever it returned and pushes the
//! result back.
//!
//! ```no_run
//! use ivcap_worker::{start_batch_service, worker_fn, JobModel, Service, ServiceContact, WorkerError};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Request { x: i64 }
//! impl JobModel for Request { const SCHEMA: &'static str = "urn:example:schema.request.1"; }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Answer { y: i64 }
//! impl JobModel for Answer { const SCHEMA: &'static str = "urn:example:schema.answer.1"; }
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = Service::new("doubler", ServiceContact {
//!         name: "Jane".into(),
//!         email: "jane@example.com".into(),
//!         url: None,
//!     });
//!     let worker = worker_fn("double", |req: Request| async move {
//!         Ok::<_, WorkerError>(Answer { y: req.x * 2 })
//!     });
//!     start_batch_service(service, worker).await;
//! }
//! ```

pub mod backtrace;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod launcher;
pub mod logging;
pub mod panic_capture;
pub mod service;
pub mod tool;
pub mod transport;
pub mod worker;
pub mod worker_loop;

pub use config::{ConfigError, WorkerConfig};
pub use context::{JobContext, OutboundPolicy, FORWARD_URL_HEADER, JOB_ID_HEADER};
pub use error::{Result, TransportError};
pub use events::{Event, EventOptions, EventReporter, EventSink, StepScope, TracingSink};
pub use executor::{JobExecutor, PANIC_ERROR_KIND};
pub use launcher::{run_batch_service, run_test_file, start_batch_service, LaunchError, ServiceArgs};
pub use logging::LogFormat;
pub use service::{
	clean_description, create_batch_service_definition, DescriptorSettings, Resources, Service,
	ServiceContact, ServiceDefinition, ServiceError, ServiceLicense,
};
pub use tool::{create_tool_definition, ToolDefinition};
pub use transport::{FetchedJob, JobTransport, SidecarClient, IS_ERROR_HEADER};
pub use worker::{worker_fn, worker_fn_with_context, FnWorker, Worker, WorkerError};
pub use worker_loop::{LoopExit, WorkerLoop, FETCH_EXHAUSTED_EXIT_CODE};

pub use ivcap_common_http::RetryConfig;
pub use ivcap_worker_core::{
	verify_result, BinaryResult, ByteStream, ExecutionError, IntoOutcome, Job, JobModel, JobResult,
	Outcome, ResultContent, SuccessResult,
};
