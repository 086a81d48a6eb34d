//! Test definition files and the call types handed to executors
//!
//! A definition is a YAML or JSON document describing one call against the
//! service under test and the response it should produce:
//!
//! ```yaml
//! name: create user
//! endpoint: http://127.0.0.1:8080/users
//! method: POST
//! headers:
//!   x-tenant: acme
//! payload: { "name": "ada" }
//! expect:
//!   status: 201
//!   body: { "name": "ada" }
//! options:
//!   partial: true
//!   ignore_fields: [id, created_at]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Definition loading errors
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid definition {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// One test case as written on disk
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    #[serde(default)]
    pub name: Option<String>,

    pub endpoint: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub payload: Option<serde_json::Value>,

    #[serde(default)]
    pub expect: ExpectedResponse,

    #[serde(default)]
    pub options: CompareOptions,

    #[serde(default)]
    pub tls: TlsSettings,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Expected outcome of the call
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedResponse {
    #[serde(default)]
    pub status: Option<u16>,

    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// Comparison options
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Expected body only needs to be a subset of the actual one
    #[serde(default)]
    pub partial: bool,

    /// Object keys ignored at any depth
    #[serde(default)]
    pub ignore_fields: Vec<String>,
}

/// TLS settings for the call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub insecure: bool,
}

/// Request passed to the executor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub endpoint: String,
    pub method: String,
    pub payload: Option<serde_json::Value>,
    pub headers: BTreeMap<String, String>,
    pub tls: TlsSettings,
}

/// Response returned by the executor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl TestDefinition {
    /// Minimal definition, mostly useful for building fixtures
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            name: None,
            endpoint: endpoint.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            payload: None,
            expect: ExpectedResponse::default(),
            options: CompareOptions::default(),
            tls: TlsSettings::default(),
        }
    }

    /// Load a definition, choosing the parser by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DefinitionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, DefinitionError> {
        let is_json = path.extension().map(|e| e == "json").unwrap_or(false);

        let definition: Self = if is_json {
            serde_json::from_str(content).map_err(|e| DefinitionError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(content).map_err(|e| DefinitionError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        definition.validate(path)?;
        Ok(definition)
    }

    fn validate(&self, path: &Path) -> Result<(), DefinitionError> {
        if self.endpoint.trim().is_empty() {
            return Err(DefinitionError::Invalid {
                path: path.to_path_buf(),
                message: "endpoint must not be empty".to_string(),
            });
        }
        if self.method.trim().is_empty() {
            return Err(DefinitionError::Invalid {
                path: path.to_path_buf(),
                message: "method must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn call_request(&self) -> CallRequest {
        CallRequest {
            endpoint: self.endpoint.clone(),
            method: self.method.to_uppercase(),
            payload: self.payload.clone(),
            headers: self.headers.clone(),
            tls: self.tls.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_definition() {
        let yaml = r#"
endpoint: http://localhost:8080/users
method: post
payload: { "name": "ada" }
expect:
  status: 201
  body: { "name": "ada" }
options:
  partial: true
  ignore_fields: [id]
"#;
        let def = TestDefinition::parse(Path::new("create.yaml"), yaml).unwrap();
        assert_eq!(def.expect.status, Some(201));
        assert!(def.options.partial);
        assert_eq!(def.call_request().method, "POST");
    }

    #[test]
    fn test_parse_json_definition_defaults() {
        let json = r#"{"endpoint": "http://localhost:9000/ping"}"#;
        let def = TestDefinition::parse(Path::new("ping.json"), json).unwrap();
        assert_eq!(def.method, "POST");
        assert!(def.headers.is_empty());
        assert!(!def.tls.insecure);
    }

    #[test]
    fn test_empty_endpoint_is_invalid() {
        let err = TestDefinition::parse(Path::new("bad.yaml"), "endpoint: ''").unwrap_err();
        assert!(matches!(err, DefinitionError::Invalid { .. }));
    }

    #[test]
    fn test_malformed_definition() {
        let err = TestDefinition::parse(Path::new("bad.json"), "{not json").unwrap_err();
        assert!(matches!(err, DefinitionError::Parse { .. }));
    }
}
