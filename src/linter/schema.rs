//! Lint schema: signatures for filters/tests/functions loaded from JSON,
//! used by the schema-aware rules in `super::rules`.

use std::fs;
use std::path::Path;

use serde::Deserialize;

/// The conventional schema path, checked when `--schema` is not given.
pub const DEFAULT_SCHEMA_PATH: &str = ".crinkle/schema.json";

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaEntry {
    pub name: String,
    #[serde(default)]
    pub params: Vec<SchemaParam>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub deprecated: Option<bool>,
}

impl SchemaEntry {
    pub fn required_params(&self) -> impl Iterator<Item = &SchemaParam> {
        self.params.iter().filter(|p| p.required && p.default.is_none())
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated.unwrap_or(false)
    }
}

/// Signatures for filters, tests, and functions, keyed by name. Loaded from
/// a single JSON document holding three top-level arrays.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub filters: Vec<SchemaEntry>,
    #[serde(default)]
    pub tests: Vec<SchemaEntry>,
    #[serde(default)]
    pub functions: Vec<SchemaEntry>,
}

/// A hand-rolled I/O/deserialization error: a small message-holding struct
/// with a hand-written `Display`, the same shape the `jinja` binary's own
/// `UsageError` uses for CLI-level I/O failures.
#[derive(Debug)]
pub struct SchemaLoadError {
    pub message: String,
}

impl std::fmt::Display for SchemaLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to load lint schema: {}", self.message)
    }
}

impl std::error::Error for SchemaLoadError {}

impl Schema {
    pub fn filter(&self, name: &str) -> Option<&SchemaEntry> {
        self.filters.iter().find(|e| e.name == name)
    }

    pub fn test(&self, name: &str) -> Option<&SchemaEntry> {
        self.tests.iter().find(|e| e.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&SchemaEntry> {
        self.functions.iter().find(|e| e.name == name)
    }

    pub fn load(path: &Path) -> Result<Schema, SchemaLoadError> {
        let text = fs::read_to_string(path).map_err(|e| SchemaLoadError {
            message: format!("{}: {e}", path.display()),
        })?;
        serde_json::from_str(&text).map_err(|e| SchemaLoadError {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Loads `.crinkle/schema.json` if present, else returns `None` without
    /// error — an absent schema simply disables the schema-aware rules.
    pub fn load_default() -> Option<Schema> {
        let path = Path::new(DEFAULT_SCHEMA_PATH);
        if path.exists() {
            Schema::load(path).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_is_none_until_a_file_exists_then_loads() {
        let dir = std::env::temp_dir().join(format!("jinja-schema-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::env::set_current_dir(&dir).unwrap();

        assert!(Schema::load_default().is_none());

        std::fs::create_dir_all(".crinkle").unwrap();
        std::fs::write(
            ".crinkle/schema.json",
            r#"{"filters":[{"name":"upper","params":[],"returns":"string"}]}"#,
        )
        .unwrap();
        let schema = Schema::load_default().expect("schema.json should load now that it exists");
        assert!(schema.filter("upper").is_some());
    }

    #[test]
    fn parses_minimal_schema_document() {
        let doc = r#"{
            "filters": [{"name": "upper", "params": [], "returns": "string"}],
            "functions": [{"name": "range", "params": [{"name": "stop", "type": "Int64", "required": true}]}]
        }"#;
        let schema: Schema = serde_json::from_str(doc).unwrap();
        assert!(schema.filter("upper").is_some());
        assert_eq!(schema.function("range").unwrap().required_params().count(), 1);
    }
}
