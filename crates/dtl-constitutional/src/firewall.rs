//! Inter-stage firewall
//!
//! Every message crossing a stage boundary passes two independent gates:
//!
//! 1. **Schema gate**: the message must validate against a named schema.
//!    `additionalProperties: false` in the schemas is what rejects injected
//!    extra keys.
//! 2. **Injection gate**: string fields whose name is high-risk (anything
//!    that may reach an execution context) are scanned against a fixed
//!    pattern list. Safe prose fields are never scanned. Inside an array held
//!    by a high-risk field, unrecognized names inherit the high-risk class.
//!
//! Errors from both gates are concatenated; a message is valid only if the
//! list is empty.

use crate::schema::SchemaRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Field names whose string values are scanned
pub const HIGH_RISK_FIELDS: &[&str] = &[
    "directives",
    "directive",
    "tool_args",
    "tool_arguments",
    "shell",
    "command",
    "code",
    "script",
    "execute",
    "eval",
    "query",
];

/// Field names whose string values are never scanned
pub const SAFE_FIELDS: &[&str] = &[
    "summary",
    "description",
    "title",
    "name",
    "label",
    "message",
    "details",
    "notes",
];

struct InjectionPattern {
    regex: Regex,
    description: &'static str,
}

static INJECTION_PATTERNS: Lazy<Vec<InjectionPattern>> = Lazy::new(|| {
    [
        (r"(?i)<script", "HTML script tag"),
        (r"(?i)javascript:", "JavaScript protocol"),
        (r"\$\([^)]+\)", "Shell command substitution"),
        (r"(?i);\s*(rm|sudo|chmod|curl|wget)\s", "Shell command chain"),
        (r"`[^`]+`", "Backtick execution"),
        (r"\{\{[^}]+\}\}", "Template injection"),
        (r"\{%[^%]+%\}", "Jinja template injection"),
        (r"exec\s*\(", "Exec call"),
        (r"eval\s*\(", "Eval call"),
    ]
    .into_iter()
    .map(|(pattern, description)| InjectionPattern {
        regex: Regex::new(pattern).expect("injection pattern is valid"),
        description,
    })
    .collect()
});

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldClass {
    Safe,
    HighRisk,
    Neutral,
}

/// Classification ignores ASCII case
fn classify(name: &str, inside_high_risk_array: bool) -> FieldClass {
    let name = name.to_ascii_lowercase();
    if SAFE_FIELDS.contains(&name.as_str()) {
        FieldClass::Safe
    } else if HIGH_RISK_FIELDS.contains(&name.as_str()) || inside_high_risk_array {
        FieldClass::HighRisk
    } else {
        FieldClass::Neutral
    }
}

fn scan(value: &Value, path: &str, class: FieldClass, inside_high_risk_array: bool, errors: &mut Vec<String>) {
    match value {
        Value::String(s) if class == FieldClass::HighRisk => {
            for pattern in INJECTION_PATTERNS.iter() {
                if pattern.regex.is_match(s) {
                    errors.push(format!(
                        "Injection pattern ({}) at {}",
                        pattern.description,
                        if path.is_empty() { "<root>" } else { path }
                    ));
                }
            }
        }
        Value::Array(items) => {
            let inherit = class == FieldClass::HighRisk || (inside_high_risk_array && class != FieldClass::Safe);
            for (i, item) in items.iter().enumerate() {
                scan(item, &format!("{path}[{i}]"), class, inherit, errors);
            }
        }
        Value::Object(map) => {
            let inherit = inside_high_risk_array && class != FieldClass::Safe;
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let child_class = classify(key, inherit);
                scan(child, &child_path, child_class, inherit && child_class != FieldClass::Safe, errors);
            }
        }
        _ => {}
    }
}

/// Run only the injection gate over `message`
#[must_use]
pub fn scan_for_injection(message: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    scan(message, "", FieldClass::Neutral, false, &mut errors);
    errors
}

/// Outcome of a firewall check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallVerdict {
    /// True only if both gates produced no errors
    pub valid: bool,
    /// Schema the message was checked against
    pub schema_name: String,
    /// Schema errors followed by injection errors
    pub errors: Vec<String>,
}

/// Schema plus injection checks at every stage boundary
#[derive(Debug, Clone)]
pub struct InterStageFirewall {
    schemas: SchemaRegistry,
}

impl InterStageFirewall {
    /// Firewall over a loaded registry
    #[inline]
    #[must_use]
    pub const fn new(schemas: SchemaRegistry) -> Self {
        Self { schemas }
    }

    /// Registered schemas
    #[inline]
    #[must_use]
    pub const fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Validate `message` against `schema_name` and scan it for injection
    #[must_use]
    pub fn validate(&self, message: &Value, schema_name: &str) -> FirewallVerdict {
        let Some(schema) = self.schemas.get(schema_name) else {
            tracing::warn!("Firewall asked for unknown schema {}", schema_name);
            return FirewallVerdict {
                valid: false,
                schema_name: schema_name.to_string(),
                errors: vec![format!("Unknown schema: {schema_name}")],
            };
        };

        let mut errors: Vec<String> = match schema.validate(message) {
            Ok(()) => Vec::new(),
            Err(violations) => violations.iter().map(ToString::to_string).collect(),
        };
        errors.extend(scan_for_injection(message));

        if !errors.is_empty() {
            tracing::warn!(
                schema = schema_name,
                count = errors.len(),
                "Firewall rejected message: {}",
                errors.join("; ")
            );
        }

        FirewallVerdict {
            valid: errors.is_empty(),
            schema_name: schema_name.to_string(),
            errors,
        }
    }
}
