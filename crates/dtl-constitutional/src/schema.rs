//! Named JSON Schema registry
//!
//! Every `*.json` file in a schema directory is compiled once and keyed by its
//! file stem (`proposal_envelope.json` → `proposal_envelope`).

use crate::error::{ConstitutionalError, ConstitutionalResult};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON pointer to the offending instance location (`/` for the root)
    pub pointer: String,
    /// Validator message
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema violation at {}: {}", self.pointer, self.message)
    }
}

/// A compiled schema, cheap to clone
#[derive(Clone)]
pub struct CompiledSchema {
    name: String,
    compiled: Arc<JSONSchema>,
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    /// Compile `schema` (draft 7)
    ///
    /// # Errors
    /// Returns [`ConstitutionalError::SchemaCompile`] if the schema is invalid
    pub fn compile(name: impl Into<String>, schema: &Value) -> ConstitutionalResult<Self> {
        let name = name.into();
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| ConstitutionalError::SchemaCompile {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name,
            compiled: Arc::new(compiled),
        })
    }

    /// Schema name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate `instance`, collecting every violation
    ///
    /// # Errors
    /// Returns the violations when `instance` does not conform
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<SchemaViolation>> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|e| {
                    let pointer = e.instance_path.to_string();
                    SchemaViolation {
                        pointer: if pointer.is_empty() { "/".to_string() } else { pointer },
                        message: e.to_string(),
                    }
                })
                .collect()),
        }
    }
}

/// Schemas keyed by name
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, CompiledSchema>,
}

impl SchemaRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every `*.json` file in `dir`
    ///
    /// A missing directory yields an empty registry, which rejects every
    /// lookup.
    ///
    /// # Errors
    /// Returns error if a schema file is unreadable, not JSON, or does not
    /// compile
    pub fn load_dir(dir: impl AsRef<Path>) -> ConstitutionalResult<Self> {
        let dir = dir.as_ref();
        let mut registry = Self::new();

        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Schema directory {} not found", dir.display());
                return Ok(registry);
            }
            Err(e) => return Err(ConstitutionalError::io_error(dir, e)),
        };

        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|x| x == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = fs::read_to_string(&path).map_err(|e| ConstitutionalError::io_error(&path, e))?;
            let schema: Value = serde_json::from_str(&text)
                .map_err(|e| ConstitutionalError::invalid_document(&path, e))?;
            registry.insert(CompiledSchema::compile(stem, &schema)?);
        }

        tracing::info!(
            count = registry.schemas.len(),
            "Loaded schemas from {}",
            dir.display()
        );
        Ok(registry)
    }

    /// Register a compiled schema, replacing any with the same name
    pub fn insert(&mut self, schema: CompiledSchema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    /// Look up a schema
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CompiledSchema> {
        self.schemas.get(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Number of schemas
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no schema is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object_schema() -> Value {
        json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "string", "pattern": "^EV-"}},
            "additionalProperties": false
        })
    }

    #[test]
    fn violations_carry_pointer() {
        let schema = CompiledSchema::compile("t", &object_schema()).unwrap();
        let errs = schema.validate(&json!({"id": "XX-1"})).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].pointer, "/id");
        assert!(errs[0].to_string().starts_with("Schema violation at /id:"));
    }

    #[test]
    fn root_violation_uses_slash() {
        let schema = CompiledSchema::compile("t", &object_schema()).unwrap();
        let errs = schema.validate(&json!({"id": "EV-1", "extra": 1})).unwrap_err();
        assert_eq!(errs[0].pointer, "/");
    }

    #[test]
    fn load_dir_keys_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("thing.json"), object_schema().to_string()).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = SchemaRegistry::load_dir(dir.path()).unwrap();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["thing"]);
        assert!(registry.get("thing").unwrap().validate(&json!({"id": "EV-9"})).is_ok());
    }

    #[test]
    fn load_dir_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        assert!(matches!(
            SchemaRegistry::load_dir(dir.path()),
            Err(ConstitutionalError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::load_dir(dir.path().join("none")).unwrap();
        assert!(registry.is_empty());
    }
}
