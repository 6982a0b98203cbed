//! Parameter schema validation (§4.6 "Parameter schema"): rejects a `run`
//! call that omits a required parameter, before anything is persisted or
//! dispatched.

use controller_store::models::{ParameterType, ReportScript};

use crate::error::ReportError;

pub fn validate_parameters(
	script: &ReportScript,
	supplied: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), ReportError> {
	for param in &script.parameters {
		let value = supplied.get(&param.name);
		if value.is_none() && param.default.is_none() {
			if param.required {
				return Err(ReportError::Validation(format!(
					"missing required parameter '{}'",
					param.name
				)));
			}
			continue;
		}
		let Some(value) = value else { continue };

		match param.param_type {
			ParameterType::Number => {
				if !value.is_number() {
					return Err(ReportError::Validation(format!("parameter '{}' must be a number", param.name)));
				}
				if let Some(n) = value.as_f64() {
					if let Some(min) = param.min {
						if n < min {
							return Err(ReportError::Validation(format!(
								"parameter '{}' must be >= {min}",
								param.name
							)));
						}
					}
					if let Some(max) = param.max {
						if n > max {
							return Err(ReportError::Validation(format!(
								"parameter '{}' must be <= {max}",
								param.name
							)));
						}
					}
				}
			},
			ParameterType::Select => {
				if let (Some(options), Some(v)) = (&param.options, value.as_str()) {
					if !options.iter().any(|o| o == v) {
						return Err(ReportError::Validation(format!(
							"parameter '{}' must be one of {:?}",
							param.name, options
						)));
					}
				}
			},
			ParameterType::Checkbox => {
				if !value.is_boolean() {
					return Err(ReportError::Validation(format!("parameter '{}' must be a boolean", param.name)));
				}
			},
			ParameterType::Text | ParameterType::Textarea | ParameterType::Date => {
				if !value.is_string() {
					return Err(ReportError::Validation(format!("parameter '{}' must be a string", param.name)));
				}
			},
		}
	}
	Ok(())
}

/// Merges supplied parameters over each parameter's declared default,
/// producing the final parameter set dispatched to the agent.
pub fn merge_defaults(
	script: &ReportScript,
	supplied: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
	let mut merged = serde_json::Map::new();
	for param in &script.parameters {
		if let Some(default) = &param.default {
			merged.insert(param.name.clone(), default.clone());
		}
	}
	for (k, v) in supplied {
		merged.insert(k.clone(), v.clone());
	}
	merged
}

#[cfg(test)]
mod tests {
	use super::*;
	use controller_store::models::ReportParameter;

	fn script_with(params: Vec<ReportParameter>) -> ReportScript {
		ReportScript {
			script_id: "disk_usage".to_string(),
			name: "Disk usage".to_string(),
			script_path: "/opt/scripts/disk_usage.sh".to_string(),
			category: None,
			description: None,
			timeout_s: 30,
			parameters: params,
		}
	}

	fn required_text(name: &str) -> ReportParameter {
		ReportParameter {
			name: name.to_string(),
			label: None,
			param_type: ParameterType::Text,
			required: true,
			default: None,
			options: None,
			min: None,
			max: None,
		}
	}

	#[test]
	fn missing_required_parameter_is_rejected() {
		let script = script_with(vec![required_text("path")]);
		let err = validate_parameters(&script, &serde_json::Map::new()).unwrap_err();
		assert!(err.to_string().contains("missing required parameter 'path'"));
	}

	#[test]
	fn present_required_parameter_passes() {
		let script = script_with(vec![required_text("path")]);
		let mut supplied = serde_json::Map::new();
		supplied.insert("path".to_string(), serde_json::json!("/var"));
		assert!(validate_parameters(&script, &supplied).is_ok());
	}

	#[test]
	fn default_satisfies_required_parameter() {
		let mut param = required_text("path");
		param.default = Some(serde_json::json!("/"));
		let script = script_with(vec![param]);
		assert!(validate_parameters(&script, &serde_json::Map::new()).is_ok());
	}
}
