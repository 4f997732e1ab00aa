// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AI tool descriptor generation.

use ivcap_worker_core::{short_type_name, JobModel};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::service::{clean_description, DescriptorSettings, Service};
use crate::worker::Worker;

pub const TOOL_SCHEMA: &str = "urn:sd-core:schema.ai-tool.1";
pub const TOOL_ID_PREFIX: &str = "urn:sd-core:ai-tool";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
	#[serde(rename = "$schema")]
	pub schema: String,
	pub id: String,
	pub name: String,
	#[serde(rename = "service-id")]
	pub service_id: String,
	pub description: String,
	pub fn_signature: String,
	pub fn_schema: Value,
}

impl ToolDefinition {
	pub fn to_json_pretty(&self) -> serde_json::Result<String> {
		serde_json::to_string_pretty(self)
	}
}

pub fn create_tool_definition<W: Worker>(
	_worker: &W,
	service: &Service,
	settings: &DescriptorSettings,
) -> ToolDefinition {
	let name = tool_name(settings.service_name.as_deref().unwrap_or(&service.name));
	let fn_schema = <W::Request as JobModel>::json_schema();
	let params = parameters(&fn_schema);
	let return_type = short_type_name::<W::Output>();

	let signature = format!(
		"{name}({}) -> {return_type}",
		params
			.iter()
			.map(|p| format!("{}: {}", p.name, p.type_name))
			.collect::<Vec<_>>()
			.join(", ")
	);

	let mut description = format!("{}\n\nArguments:\n", service.description);
	for p in &params {
		description.push_str(&format!("  {}: {}", p.name, p.type_name));
		if let Some(text) = &p.description {
			description.push_str(&format!(" - {text}"));
		}
		if let Some(default) = &p.default {
			description.push_str(&format!(" (Defaults to {default})"));
		}
		description.push('\n');
	}
	description.push_str(&format!("\nReturns: {return_type}"));

	ToolDefinition {
		schema: TOOL_SCHEMA.to_string(),
		id: format!("{TOOL_ID_PREFIX}.{name}"),
		service_id: settings.service_id().to_string(),
		description: clean_description(description.trim()),
		fn_signature: signature,
		fn_schema,
		name,
	}
}

/// Lower snake case: spaces and dashes become underscores.
pub fn tool_name(name: &str) -> String {
	name.replace([' ', '-'], "_").to_lowercase()
}

struct Parameter {
	name: String,
	type_name: String,
	description: Option<String>,
	default: Option<Value>,
}

fn parameters(schema: &Value) -> Vec<Parameter> {
	let empty = Map::new();
	let properties = schema
		.get("properties")
		.and_then(Value::as_object)
		.unwrap_or(&empty);
	let required: Vec<&str> = schema
		.get("required")
		.and_then(Value::as_array)
		.map(|r| r.iter().filter_map(Value::as_str).collect())
		.unwrap_or_default();

	properties
		.iter()
		.filter(|(name, _)| name.as_str() != "$schema")
		.map(|(name, info)| {
			let default = info.get("default").cloned();
			let mut type_name = json_type_name(info);
			if default.is_some() || !required.contains(&name.as_str()) {
				type_name = format!("Optional[{type_name}]");
			}
			Parameter {
				name: name.clone(),
				type_name,
				description: info
					.get("description")
					.and_then(Value::as_str)
					.map(str::to_string),
				default,
			}
		})
		.collect()
}

fn json_type_name(info: &Value) -> String {
	let scalar = |t: &str| -> String {
		match t {
			"string" => "str",
			"integer" => "int",
			"number" => "float",
			"boolean" => "bool",
			other => other,
		}
		.to_string()
	};

	match info.get("type").and_then(Value::as_str) {
		Some("array") => {
			let item = info
				.get("items")
				.and_then(|i| i.get("type"))
				.and_then(Value::as_str)
				.unwrap_or("Any");
			format!("array[{}]", scalar(item))
		}
		Some(t) => scalar(t),
		None => "Any".to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::service::ServiceContact;
	use crate::worker::{worker_fn, WorkerError};
	use serde::Deserialize;
	use serde_json::json;

	#[derive(Debug, Serialize, Deserialize)]
	struct SleepRequest {
		duration: u64,
		tags: Vec<String>,
		label: Option<String>,
	}

	impl JobModel for SleepRequest {
		const SCHEMA: &'static str = "urn:test:schema.sleep.request.1";

		fn json_schema() -> Value {
			json!({
				"type": "object",
				"properties": {
					"$schema": {"type": "string"},
					"duration": {"type": "integer", "description": "seconds to sleep"},
					"tags": {"type": "array", "items": {"type": "string"}},
					"label": {"type": "string", "default": "none"}
				},
				"required": ["duration", "tags"]
			})
		}
	}

	#[derive(Debug, Serialize, Deserialize)]
	struct SleepResult {
		slept: u64,
	}

	impl JobModel for SleepResult {
		const SCHEMA: &'static str = "urn:test:schema.sleep.result.1";
	}

	fn service() -> Service {
		Service::new(
			"Sleepy Tool-Service",
			ServiceContact {
				name: "Ops".to_string(),
				email: "ops@example.com".to_string(),
				url: None,
			},
		)
		.description("Sleeps   for a while.")
	}

	fn worker() -> impl Worker {
		worker_fn("sleep", |req: SleepRequest| async move {
			Ok::<_, WorkerError>(SleepResult {
				slept: req.duration,
			})
		})
	}

	#[test]
	fn tool_names_are_snake_case() {
		assert_eq!(tool_name("Sleepy Tool-Service"), "sleepy_tool_service");
	}

	#[test]
	fn builds_tool_definition() {
		let tool = create_tool_definition(&worker(), &service(), &DescriptorSettings::default());
		assert_eq!(tool.schema, TOOL_SCHEMA);
		assert_eq!(tool.id, "urn:sd-core:ai-tool.sleepy_tool_service");
		assert_eq!(tool.service_id, "#SERVICE_ID#");
		assert_eq!(
			tool.fn_signature,
			"sleepy_tool_service(duration: int, label: Optional[str], tags: array[str]) -> SleepResult"
		);
		assert!(tool.description.starts_with("Sleeps for a while.\nArguments:"));
		assert!(tool.description.contains("duration: int - seconds to sleep"));
		assert!(tool.description.contains("label: Optional[str] (Defaults to \"none\")"));
		assert!(tool.description.ends_with("Returns: SleepResult"));
		assert_eq!(tool.fn_schema["required"], json!(["duration", "tags"]));
	}

	#[test]
	fn service_name_can_be_overridden() {
		let settings = DescriptorSettings {
			service_name: Some("Renamed".to_string()),
			service_id: Some("urn:ivcap:service:9".to_string()),
			..DescriptorSettings::default()
		};
		let tool = create_tool_definition(&worker(), &service(), &settings);
		assert_eq!(tool.name, "renamed");
		assert_eq!(tool.service_id, "urn:ivcap:service:9");

		let json: Value = serde_json::from_str(&tool.to_json_pretty().unwrap()).unwrap();
		assert_eq!(json["service-id"], "urn:ivcap:service:9");
		assert_eq!(json["$schema"], TOOL_SCHEMA);
	}
}
