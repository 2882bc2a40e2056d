//! Interprets raw classifier replies under the strict-routing contract.
//!
//! A reply must be exactly one structured call naming a catalog entry, or
//! free text asking the user to clarify. Everything else is a protocol
//! violation and must stay distinguishable from a legitimate clarification.

use crate::catalog::{CapabilityCatalog, CapabilityDescriptor};
use crate::routing::RoutingDecision;
use medirouter_common::{Result, RouterError};
use medirouter_llm::{FunctionCall, LlmResponse};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Shown when the classifier chose free text but sent an empty string.
pub const DEFAULT_CLARIFICATION: &str = "I could not process that request. Please try again.";

/// Finish reason Gemini reports when it produced an unparseable call.
const MALFORMED_CALL_FINISH_REASON: &str = "MALFORMED_FUNCTION_CALL";

/// Parse a classifier reply into a routing decision.
pub fn parse(reply: &LlmResponse, catalog: &CapabilityCatalog) -> Result<RoutingDecision> {
    if reply.finish_reason.as_deref() == Some(MALFORMED_CALL_FINISH_REASON) {
        return Err(RouterError::ProtocolViolation(
            "classifier reported a malformed function call".into(),
        ));
    }

    match reply.function_calls.as_slice() {
        [] => match reply.content.as_deref() {
            Some(text) => {
                if text.trim().is_empty() {
                    debug!("Empty free-text reply, using default clarification");
                    Ok(RoutingDecision::clarification(DEFAULT_CLARIFICATION))
                } else {
                    Ok(RoutingDecision::clarification(text))
                }
            }
            None => Err(RouterError::ProtocolViolation(
                "reply contained neither a function call nor text".into(),
            )),
        },
        [call] => {
            if let Some(text) = reply.content.as_deref().filter(|t| !t.trim().is_empty()) {
                warn!(
                    function = %call.name,
                    text_len = text.len(),
                    "Reply mixed text with a function call, ignoring text"
                );
            }
            parse_call(call, catalog)
        }
        calls => Err(RouterError::ProtocolViolation(format!(
            "expected exactly one function call, got {} ({})",
            calls.len(),
            calls
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn parse_call(call: &FunctionCall, catalog: &CapabilityCatalog) -> Result<RoutingDecision> {
    let descriptor = catalog.get(&call.name).ok_or_else(|| {
        RouterError::ProtocolViolation(format!("unknown capability '{}'", call.name))
    })?;

    let arguments = validate_arguments(descriptor, &call.args)?;

    Ok(RoutingDecision::Dispatch {
        target: descriptor.name.clone(),
        arguments,
    })
}

/// Check call arguments against the descriptor's schema.
///
/// Missing required fields are protocol violations; wrong kinds and
/// undeclared fields are validation errors. `null` counts as absent.
fn validate_arguments(
    descriptor: &CapabilityDescriptor,
    args: &Value,
) -> Result<Map<String, Value>> {
    let empty = Map::new();
    let provided = match args {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(RouterError::Validation(format!(
                "arguments for '{}' must be an object, got {}",
                descriptor.name,
                json_kind(other)
            )));
        }
    };

    if let Some(missing) = descriptor
        .required_arguments()
        .find(|spec| provided.get(&spec.name).map_or(true, Value::is_null))
    {
        return Err(RouterError::ProtocolViolation(format!(
            "call to '{}' is missing required argument '{}'",
            descriptor.name, missing.name
        )));
    }

    let mut accepted = Map::new();
    for (name, value) in provided {
        let spec = descriptor.argument(name).ok_or_else(|| {
            RouterError::Validation(format!(
                "'{}' does not accept argument '{}'",
                descriptor.name, name
            ))
        })?;

        if value.is_null() {
            continue;
        }

        if !spec.kind.accepts(value) {
            return Err(RouterError::Validation(format!(
                "argument '{}' of '{}' must be {}, got {}",
                name,
                descriptor.name,
                spec.kind.as_str(),
                json_kind(value)
            )));
        }

        accepted.insert(name.clone(), value.clone());
    }

    Ok(accepted)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
