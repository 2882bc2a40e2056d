//! The capability catalog: the only vocabulary the classifier may choose from.

use medirouter_common::{Result, RouterError};
use medirouter_llm::FunctionDeclaration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// JSON type an argument value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentKind {
    String,
    Number,
    Integer,
    Boolean,
}

impl ArgumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

fn default_required() -> bool {
    true
}

/// One named, typed field of a capability's argument schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    pub kind: ArgumentKind,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

impl ArgumentSpec {
    pub fn required(name: &str, kind: ArgumentKind, description: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: &str, kind: ArgumentKind, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// A callable agent: name, purpose and argument schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique identifier, also the function name offered to the classifier
    pub name: String,

    /// Display name for presentation layers
    #[serde(default)]
    pub label: String,

    pub description: String,

    /// Ordered argument schema
    pub arguments: Vec<ArgumentSpec>,

    /// Designated target for sensitive-data requests lacking context
    #[serde(default)]
    pub handles_sensitive_data: bool,
}

impl CapabilityDescriptor {
    pub fn argument(&self, name: &str) -> Option<&ArgumentSpec> {
        self.arguments.iter().find(|a| a.name == name)
    }

    pub fn required_arguments(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.arguments.iter().filter(|a| a.required)
    }

    /// JSON-schema encoding of the argument schema.
    pub fn parameters_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .arguments
            .iter()
            .map(|arg| {
                (
                    arg.name.clone(),
                    json!({"type": arg.kind.as_str(), "description": arg.description}),
                )
            })
            .collect();
        let required: Vec<&str> = self.required_arguments().map(|a| a.name.as_str()).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn function_declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Serialized form of a catalog, as found in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub capabilities: Vec<CapabilityDescriptor>,
}

fn default_version() -> u32 {
    1
}

/// Fixed, validated, ordered registry of capabilities.
///
/// Built once at start-up and never mutated. Lookups go through a name
/// index, so adding a capability needs no code changes elsewhere.
#[derive(Debug, Clone)]
pub struct CapabilityCatalog {
    version: u32,
    capabilities: Vec<CapabilityDescriptor>,
    index: HashMap<String, usize>,
}

impl CapabilityCatalog {
    pub fn new(version: u32, capabilities: Vec<CapabilityDescriptor>) -> Result<Self> {
        if capabilities.is_empty() {
            return Err(RouterError::Config(
                "Capability catalog must declare at least one capability".into(),
            ));
        }

        let mut index = HashMap::with_capacity(capabilities.len());
        let mut sensitive = None;

        for (position, descriptor) in capabilities.iter().enumerate() {
            if descriptor.name.trim().is_empty() {
                return Err(RouterError::Config(format!(
                    "Capability at position {position} has an empty name"
                )));
            }
            if index.insert(descriptor.name.clone(), position).is_some() {
                return Err(RouterError::Config(format!(
                    "Duplicate capability name '{}'",
                    descriptor.name
                )));
            }
            if descriptor.arguments.is_empty() {
                return Err(RouterError::Config(format!(
                    "Capability '{}' must declare at least one argument",
                    descriptor.name
                )));
            }
            for (i, arg) in descriptor.arguments.iter().enumerate() {
                if descriptor.arguments[..i].iter().any(|a| a.name == arg.name) {
                    return Err(RouterError::Config(format!(
                        "Capability '{}' declares argument '{}' twice",
                        descriptor.name, arg.name
                    )));
                }
            }
            if descriptor.handles_sensitive_data {
                if let Some(previous) = sensitive.replace(&descriptor.name) {
                    return Err(RouterError::Config(format!(
                        "Both '{}' and '{}' are marked as the sensitive-data capability",
                        previous, descriptor.name
                    )));
                }
            }
        }

        Ok(Self {
            version,
            capabilities,
            index,
        })
    }

    pub fn from_config(config: CatalogConfig) -> Result<Self> {
        Self::new(config.version, config.capabilities)
    }

    /// The default medical catalog: patient services, medical assistant,
    /// document generator and admin operations.
    pub fn medical() -> Self {
        let query = |description: &str| {
            vec![ArgumentSpec::required(
                "query",
                ArgumentKind::String,
                description,
            )]
        };

        let capabilities = vec![
            CapabilityDescriptor {
                name: "manage_patient_info".into(),
                label: "Patient Services".into(),
                description: "Handles patient queries, appointments, registration and sensitive data checks.".into(),
                arguments: query("The specific patient-related query"),
                handles_sensitive_data: true,
            },
            CapabilityDescriptor {
                name: "assist_medical_info".into(),
                label: "Medical Assistant".into(),
                description: "Provides support for medical research and diagnostic assistance.".into(),
                arguments: query("The medical question or research topic"),
                handles_sensitive_data: false,
            },
            CapabilityDescriptor {
                name: "generate_document".into(),
                label: "Doc Generator".into(),
                description: "Creates structured documents such as reports, referrals or forms.".into(),
                arguments: vec![
                    ArgumentSpec::required(
                        "document_type",
                        ArgumentKind::String,
                        "Type of document (e.g., referral, prescription)",
                    ),
                    ArgumentSpec::required(
                        "content_details",
                        ArgumentKind::String,
                        "Details to include in the document",
                    ),
                ],
                handles_sensitive_data: false,
            },
            CapabilityDescriptor {
                name: "handle_admin_task".into(),
                label: "Admin Operations".into(),
                description: "Helps with general administration, operational policies and scheduling.".into(),
                arguments: query("The admin task or policy question"),
                handles_sensitive_data: false,
            },
        ];

        Self::new(1, capabilities).expect("built-in medical catalog is valid")
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn list_capabilities(&self) -> &[CapabilityDescriptor] {
        &self.capabilities
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&i| &self.capabilities[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn sensitive_data_capability(&self) -> Option<&CapabilityDescriptor> {
        self.capabilities.iter().find(|c| c.handles_sensitive_data)
    }

    pub fn function_declarations(&self) -> Vec<FunctionDeclaration> {
        self.capabilities
            .iter()
            .map(CapabilityDescriptor::function_declaration)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: name.into(),
            label: String::new(),
            description: format!("{name} handler"),
            arguments: vec![ArgumentSpec::required("query", ArgumentKind::String, "q")],
            handles_sensitive_data: false,
        }
    }

    #[test]
    fn medical_catalog_has_four_ordered_capabilities() {
        let catalog = CapabilityCatalog::medical();
        let names: Vec<&str> = catalog
            .list_capabilities()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "manage_patient_info",
                "assist_medical_info",
                "generate_document",
                "handle_admin_task"
            ]
        );
        assert_eq!(
            catalog.sensitive_data_capability().map(|c| c.name.as_str()),
            Some("manage_patient_info")
        );
        assert_eq!(catalog.version(), 1);
    }

    #[test]
    fn lookup_by_name() {
        let catalog = CapabilityCatalog::medical();
        let doc = catalog.get("generate_document").unwrap();
        assert_eq!(doc.required_arguments().count(), 2);
        assert!(catalog.get("unknown_agent").is_none());
        assert!(catalog.contains("handle_admin_task"));
    }

    #[test]
    fn rejects_empty_catalog() {
        assert!(matches!(
            CapabilityCatalog::new(1, vec![]),
            Err(RouterError::Config(_))
        ));
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = CapabilityCatalog::new(1, vec![descriptor("a"), descriptor("a")]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_capability_without_arguments() {
        let mut bare = descriptor("bare");
        bare.arguments.clear();
        assert!(CapabilityCatalog::new(1, vec![bare]).is_err());
    }

    #[test]
    fn rejects_duplicate_argument_names() {
        let mut dup = descriptor("dup");
        dup.arguments
            .push(ArgumentSpec::optional("query", ArgumentKind::String, "again"));
        assert!(CapabilityCatalog::new(1, vec![dup]).is_err());
    }

    #[test]
    fn rejects_two_sensitive_capabilities() {
        let mut a = descriptor("a");
        a.handles_sensitive_data = true;
        let mut b = descriptor("b");
        b.handles_sensitive_data = true;
        assert!(CapabilityCatalog::new(1, vec![a, b]).is_err());
    }

    #[test]
    fn parameters_schema_lists_required_fields() {
        let mut desc = descriptor("lookup");
        desc.arguments
            .push(ArgumentSpec::optional("limit", ArgumentKind::Integer, "max rows"));
        let schema = desc.parameters_schema();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["required"], json!(["query"]));
    }

    #[test]
    fn argument_kinds_check_values() {
        assert!(ArgumentKind::String.accepts(&json!("x")));
        assert!(!ArgumentKind::String.accepts(&json!(1)));
        assert!(ArgumentKind::Integer.accepts(&json!(3)));
        assert!(!ArgumentKind::Integer.accepts(&json!(3.5)));
        assert!(ArgumentKind::Number.accepts(&json!(3.5)));
        assert!(ArgumentKind::Boolean.accepts(&json!(false)));
    }

    #[test]
    fn catalog_loads_from_toml() {
        let config: CatalogConfig = toml::from_str(
            r#"
version = 3

[[capabilities]]
name = "triage_lab_result"
label = "Lab Results"
description = "Explains lab results"
handles_sensitive_data = true

[[capabilities.arguments]]
name = "test_name"
kind = "string"

[[capabilities.arguments]]
name = "urgent"
kind = "boolean"
required = false
"#,
        )
        .unwrap();

        let catalog = CapabilityCatalog::from_config(config).unwrap();
        assert_eq!(catalog.version(), 3);
        let cap = catalog.get("triage_lab_result").unwrap();
        assert!(cap.argument("test_name").unwrap().required);
        assert!(!cap.argument("urgent").unwrap().required);
    }
}
