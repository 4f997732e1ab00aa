// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Progress events emitted by workers while a job runs.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

pub const GENERIC_EVENT_SCHEMA: &str = "urn:ivcap:schema:service.event.generic.1";
pub const ERROR_EVENT_SCHEMA: &str = "urn:ivcap:schema:service.event.error.1";
pub const STEP_START_EVENT_SCHEMA: &str = "urn:ivcap:schema:service.event.step.start.1";
pub const STEP_INFO_EVENT_SCHEMA: &str = "urn:ivcap:schema:service.event.step.info.1";
pub const STEP_ERROR_EVENT_SCHEMA: &str = "urn:ivcap:schema:service.event.step.error.1";
pub const STEP_FINISH_EVENT_SCHEMA: &str = "urn:ivcap:schema:service.event.step.finish.1";

pub type EventOptions = Map<String, Value>;

/// A single progress event. Serializes to its payload with `$schema` added.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
	schema: String,
	payload: Map<String, Value>,
}

impl Event {
	pub fn new(schema: impl Into<String>, payload: Map<String, Value>) -> Self {
		Self {
			schema: schema.into(),
			payload,
		}
	}

	pub fn generic(name: impl Into<String>, options: Option<EventOptions>) -> Self {
		Self::named(GENERIC_EVENT_SCHEMA, name.into(), options)
	}

	pub fn step_start(name: impl Into<String>, options: Option<EventOptions>) -> Self {
		Self::named(STEP_START_EVENT_SCHEMA, name.into(), options)
	}

	pub fn step_info(name: impl Into<String>, options: Option<EventOptions>) -> Self {
		Self::named(STEP_INFO_EVENT_SCHEMA, name.into(), options)
	}

	pub fn step_finish(name: impl Into<String>, options: Option<EventOptions>) -> Self {
		Self::named(STEP_FINISH_EVENT_SCHEMA, name.into(), options)
	}

	pub fn error(error: impl Into<String>, context: Option<String>) -> Self {
		Self::failure(ERROR_EVENT_SCHEMA, None, error.into(), context)
	}

	pub fn step_error(name: impl Into<String>, error: impl Into<String>) -> Self {
		Self::failure(STEP_ERROR_EVENT_SCHEMA, Some(name.into()), error.into(), None)
	}

	fn named(schema: &str, name: String, options: Option<EventOptions>) -> Self {
		let mut payload = Map::new();
		payload.insert("name".to_string(), Value::String(name));
		if let Some(options) = options {
			payload.insert("options".to_string(), Value::Object(options));
		}
		Self::new(schema, payload)
	}

	fn failure(schema: &str, name: Option<String>, error: String, context: Option<String>) -> Self {
		let mut payload = Map::new();
		if let Some(name) = name {
			payload.insert("name".to_string(), Value::String(name));
		}
		payload.insert("error".to_string(), Value::String(error));
		if let Some(context) = context {
			payload.insert("context".to_string(), Value::String(context));
		}
		Self::new(schema, payload)
	}

	pub fn schema(&self) -> &str {
		&self.schema
	}

	pub fn payload(&self) -> &Map<String, Value> {
		&self.payload
	}

	pub fn to_json(&self) -> Value {
		let mut map = self.payload.clone();
		map.insert("$schema".to_string(), Value::String(self.schema.clone()));
		Value::Object(map)
	}
}

/// Destination for events.
pub trait EventSink: Send + Sync {
	fn emit(&self, job_id: &str, authorization: Option<&str>, event: &Event);
}

/// Writes events to the debug log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
	fn emit(&self, job_id: &str, _authorization: Option<&str>, event: &Event) {
		debug!(job_id = %job_id, schema = %event.schema(), event = %event.to_json(), "job event");
	}
}

/// Per-job handle workers use to report progress.
#[derive(Clone)]
pub struct EventReporter {
	job_id: String,
	authorization: Option<String>,
	sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for EventReporter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventReporter")
			.field("job_id", &self.job_id)
			.finish_non_exhaustive()
	}
}

impl EventReporter {
	pub fn new(job_id: impl Into<String>, authorization: Option<String>, sink: Arc<dyn EventSink>) -> Self {
		Self {
			job_id: job_id.into(),
			authorization,
			sink,
		}
	}

	pub fn job_id(&self) -> &str {
		&self.job_id
	}

	pub fn emit(&self, event: Event) {
		self.sink
			.emit(&self.job_id, self.authorization.as_deref(), &event);
	}

	pub fn info(&self, name: impl Into<String>, options: Option<EventOptions>) {
		self.emit(Event::generic(name, options));
	}

	pub fn error(&self, error: impl Into<String>, context: Option<String>) {
		self.emit(Event::error(error, context));
	}

	pub fn step_started(&self, name: impl Into<String>, options: Option<EventOptions>) {
		self.emit(Event::step_start(name, options));
	}

	pub fn step_finished(&self, name: impl Into<String>, options: Option<EventOptions>) {
		self.emit(Event::step_finish(name, options));
	}

	/// Opens a step. The step is finished when the returned scope is
	/// dropped, or reported as failed if the thread is panicking.
	pub fn step(&self, name: impl Into<String>, options: Option<EventOptions>) -> StepScope {
		let name = name.into();
		self.step_started(name.clone(), options);
		StepScope {
			reporter: self.clone(),
			name,
			closed: false,
		}
	}

	/// Runs `fut` as a named step, reporting its error if it fails.
	pub async fn run_step<T, E, Fut>(&self, name: impl Into<String>, fut: Fut) -> Result<T, E>
	where
		Fut: Future<Output = Result<T, E>>,
		E: std::fmt::Display,
	{
		let scope = self.step(name, None);
		match fut.await {
			Ok(value) => {
				scope.finish(None);
				Ok(value)
			}
			Err(err) => {
				scope.fail(&err);
				Err(err)
			}
		}
	}
}

pub struct StepScope {
	reporter: EventReporter,
	name: String,
	closed: bool,
}

impl StepScope {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn info(&self, options: Option<EventOptions>) {
		self.reporter.emit(Event::step_info(self.name.clone(), options));
	}

	pub fn finish(mut self, options: Option<EventOptions>) {
		self.closed = true;
		self.reporter
			.emit(Event::step_finish(self.name.clone(), options));
	}

	pub fn fail(mut self, err: &dyn std::fmt::Display) {
		self.closed = true;
		self.reporter
			.emit(Event::step_error(self.name.clone(), err.to_string()));
	}
}

impl Drop for StepScope {
	fn drop(&mut self) {
		if self.closed {
			return;
		}
		let event = if std::thread::panicking() {
			Event::step_error(self.name.clone(), "panicked")
		} else {
			Event::step_finish(self.name.clone(), None)
		};
		self.reporter.emit(event);
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use std::sync::Mutex;

	#[derive(Default)]
	pub(crate) struct RecordingSink {
		pub(crate) events: Mutex<Vec<(String, Option<String>, Event)>>,
	}

	impl RecordingSink {
		pub(crate) fn schemas(&self) -> Vec<String> {
			self.events
				.lock()
				.unwrap()
				.iter()
				.map(|(_, _, e)| e.schema().to_string())
				.collect()
		}
	}

	impl EventSink for RecordingSink {
		fn emit(&self, job_id: &str, authorization: Option<&str>, event: &Event) {
			self.events.lock().unwrap().push((
				job_id.to_string(),
				authorization.map(str::to_string),
				event.clone(),
			));
		}
	}

	fn reporter() -> (Arc<RecordingSink>, EventReporter) {
		let sink = Arc::new(RecordingSink::default());
		let reporter = EventReporter::new("job-1", Some("Bearer t".to_string()), sink.clone());
		(sink, reporter)
	}

	#[test]
	fn event_json_carries_schema() {
		let mut options = EventOptions::new();
		options.insert("progress".to_string(), Value::from(50));
		let json = Event::step_info("load", Some(options)).to_json();
		assert_eq!(
			json,
			serde_json::json!({
				"$schema": STEP_INFO_EVENT_SCHEMA,
				"name": "load",
				"options": {"progress": 50}
			})
		);
	}

	#[test]
	fn error_event_has_context() {
		let json = Event::error("bad input", Some("parsing".to_string())).to_json();
		assert_eq!(json["$schema"], ERROR_EVENT_SCHEMA);
		assert_eq!(json["context"], "parsing");
	}

	#[test]
	fn reporter_tags_events_with_job() {
		let (sink, reporter) = reporter();
		reporter.info("hello", None);
		let events = sink.events.lock().unwrap();
		assert_eq!(events[0].0, "job-1");
		assert_eq!(events[0].1.as_deref(), Some("Bearer t"));
	}

	#[test]
	fn dropped_step_is_finished() {
		let (sink, reporter) = reporter();
		{
			let step = reporter.step("compute", None);
			step.info(None);
		}
		assert_eq!(
			sink.schemas(),
			vec![
				STEP_START_EVENT_SCHEMA,
				STEP_INFO_EVENT_SCHEMA,
				STEP_FINISH_EVENT_SCHEMA
			]
		);
	}

	#[test]
	fn failed_step_is_reported_once() {
		let (sink, reporter) = reporter();
		reporter.step("compute", None).fail(&"division by zero");
		assert_eq!(
			sink.schemas(),
			vec![STEP_START_EVENT_SCHEMA, STEP_ERROR_EVENT_SCHEMA]
		);
	}

	#[tokio::test]
	async fn run_step_reports_errors() {
		let (sink, reporter) = reporter();
		let ok: Result<u32, String> = reporter.run_step("a", async { Ok(1) }).await;
		assert_eq!(ok, Ok(1));
		let err: Result<u32, String> = reporter
			.run_step("b", async { Err("nope".to_string()) })
			.await;
		assert!(err.is_err());

		assert_eq!(
			sink.schemas(),
			vec![
				STEP_START_EVENT_SCHEMA,
				STEP_FINISH_EVENT_SCHEMA,
				STEP_START_EVENT_SCHEMA,
				STEP_ERROR_EVENT_SCHEMA
			]
		);
		let events = sink.events.lock().unwrap();
		assert_eq!(events[3].2.payload()["error"], "nope");
	}
}
