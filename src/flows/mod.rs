// Built-in flows and parameter helpers

use serde_json::Value;
use uuid::Uuid;

use crate::engine::{FlowError, FlowRegistry, Parameters};

pub mod project_create;
pub mod role_update;
pub mod zone_create;

pub use project_create::ProjectCreateFlow;
pub use role_update::RoleUpdateFlow;
pub use zone_create::ZoneCreateFlow;

/// Register every built-in flow
pub fn register_default_flows(registry: &mut FlowRegistry) -> Result<(), FlowError> {
    registry.register(zone_create::NAME, |init| Box::new(ZoneCreateFlow::new(init)))?;
    registry.register(project_create::NAME, |init| Box::new(ProjectCreateFlow::new(init)))?;
    registry.register(role_update::NAME, |init| Box::new(RoleUpdateFlow::new(init)))?;
    Ok(())
}

pub fn default_registry() -> Result<FlowRegistry, FlowError> {
    let mut registry = FlowRegistry::new();
    register_default_flows(&mut registry)?;
    Ok(registry)
}

fn invalid(field: &str, reason: impl Into<String>) -> FlowError {
    FlowError::InvalidParameter {
        field: field.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn str_param<'a>(params: &'a Parameters, field: &str) -> Result<&'a str, FlowError> {
    match params.get(field) {
        Some(Value::String(s)) => Ok(s),
        None | Some(Value::Null) => Err(FlowError::MissingField {
            field: field.to_string(),
        }),
        Some(_) => Err(invalid(field, "expected a string")),
    }
}

pub(crate) fn opt_str_param<'a>(
    params: &'a Parameters,
    field: &str,
) -> Result<Option<&'a str>, FlowError> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(invalid(field, "expected a string")),
    }
}

pub(crate) fn uuid_param(params: &Parameters, field: &str) -> Result<Uuid, FlowError> {
    let raw = str_param(params, field)?;
    Uuid::parse_str(raw).map_err(|e| invalid(field, format!("not a UUID: {e}")))
}

pub(crate) fn str_list_param(params: &Parameters, field: &str) -> Result<Vec<String>, FlowError> {
    match params.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(field, "expected a list of strings"))
            })
            .collect(),
        None | Some(Value::Null) => Err(FlowError::MissingField {
            field: field.to_string(),
        }),
        Some(_) => Err(invalid(field, "expected a list of strings")),
    }
}
