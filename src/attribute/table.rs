//! Table attribute: records addressed by table name and id on an endpoint

use serde::{Deserialize, Serialize};
use url::Url;

use super::{AttributeField, BindingAttribute, StoreAttribute};
use crate::config::{BindingOptions, ConnectionOptions};
use crate::error::BindError;
use crate::store::{ConnectionIdentity, WriteMode};

/// Binds a parameter to a table on an endpoint.
///
/// `endpoint_setting` and `api_key_setting` name settings. An empty
/// `api_key_setting` means the endpoint takes no key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableAttribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_setting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_setting: Option<String>,
}

impl TableAttribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_endpoint_setting(mut self, setting: impl Into<String>) -> Self {
        self.endpoint_setting = Some(setting.into());
        self
    }

    pub fn with_api_key_setting(mut self, setting: impl Into<String>) -> Self {
        self.api_key_setting = Some(setting.into());
        self
    }
}

impl BindingAttribute for TableAttribute {
    const KIND: &'static str = "Table";

    fn fields_mut(&mut self) -> Vec<AttributeField<'_>> {
        vec![
            AttributeField::auto("table_name", &mut self.table_name),
            AttributeField::auto("id", &mut self.id),
            AttributeField::app_setting("endpoint_setting", &mut self.endpoint_setting),
            AttributeField::app_setting("api_key_setting", &mut self.api_key_setting),
        ]
    }
}

impl StoreAttribute for TableAttribute {
    const DEFAULT_CONNECTION_SETTING: &'static str = "RULEBIND_TABLE_URI";
    const DEFAULT_API_KEY_SETTING: Option<&'static str> = Some("RULEBIND_TABLE_API_KEY");

    fn collection(&self) -> Option<String> {
        self.table_name.clone().filter(|t| !t.is_empty())
    }

    fn record_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn connection(&self) -> Option<&str> {
        self.endpoint_setting.as_deref()
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key_setting.as_deref()
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Insert
    }

    fn options(options: &BindingOptions) -> &ConnectionOptions {
        &options.table
    }

    fn identity(
        connection: String,
        api_key: Option<String>,
    ) -> Result<ConnectionIdentity, BindError> {
        let endpoint = Url::parse(&connection).map_err(|e| BindError::ConfigurationMissing {
            setting: Self::DEFAULT_CONNECTION_SETTING.to_string(),
            reason: format!("table endpoint must be an absolute URL: {e}"),
        })?;
        Ok(ConnectionIdentity::new(endpoint.to_string(), api_key))
    }
}
