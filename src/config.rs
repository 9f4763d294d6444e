//! Binding options
//!
//! The explicit configuration layer between attribute fields and
//! environment-style defaults. Connection precedence per attribute kind:
//!
//! ```text
//! attribute field  →  BindingOptions.<kind>  →  default setting (environment)
//! ```
//!
//! ```yaml
//! table:
//!   connection: https://tables.example.net
//!   api_key: secret
//! document:
//!   connection: "AccountEndpoint=https://docs.example.net;AccountKey=..."
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BindError;

/// Connection settings for one attribute kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Endpoint URL or connection string
    pub connection: Option<String>,
    pub api_key: Option<String>,
}

impl ConnectionOptions {
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: Some(connection.into()),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingOptions {
    pub table: ConnectionOptions,
    pub document: ConnectionOptions,
}

impl BindingOptions {
    pub fn from_yaml(yaml: &str) -> Result<Self, BindError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BindError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }
}
