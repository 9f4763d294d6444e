//! Document attribute: records in a database collection, addressed by id and
//! partition key, or selected by a parameterized SQL query

use serde::{Deserialize, Serialize};

use super::{AttributeField, BindingAttribute, StoreAttribute};
use crate::binding::{ParameterizedQuery, SqlParameter};
use crate::config::{BindingOptions, ConnectionOptions};
use crate::store::WriteMode;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAttribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    /// Filled by per-invocation resolution of `sql_query`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sql_parameters: Vec<SqlParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_setting: Option<String>,
    #[serde(default)]
    pub create_if_not_exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_throughput: Option<u32>,
}

impl DocumentAttribute {
    pub fn new(database_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            database_name: Some(database_name.into()),
            collection_name: Some(collection_name.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn with_sql_query(mut self, query: impl Into<String>) -> Self {
        self.sql_query = Some(query.into());
        self
    }

    pub fn with_connection_setting(mut self, setting: impl Into<String>) -> Self {
        self.connection_setting = Some(setting.into());
        self
    }

    /// Create the collection on first write, optionally with a throughput hint
    pub fn with_create_if_not_exists(mut self, throughput: Option<u32>) -> Self {
        self.create_if_not_exists = true;
        self.collection_throughput = throughput;
        self
    }
}

impl BindingAttribute for DocumentAttribute {
    const KIND: &'static str = "Document";

    fn fields_mut(&mut self) -> Vec<AttributeField<'_>> {
        vec![
            AttributeField::auto("database_name", &mut self.database_name),
            AttributeField::auto("collection_name", &mut self.collection_name),
            AttributeField::auto("id", &mut self.id),
            AttributeField::auto("partition_key", &mut self.partition_key),
            AttributeField::sql_query("sql_query", &mut self.sql_query, &mut self.sql_parameters),
            AttributeField::app_setting("connection_setting", &mut self.connection_setting),
        ]
    }
}

impl StoreAttribute for DocumentAttribute {
    const DEFAULT_CONNECTION_SETTING: &'static str = "RULEBIND_DOCUMENT_CONNECTION";

    fn collection(&self) -> Option<String> {
        let collection = self.collection_name.as_deref().filter(|c| !c.is_empty())?;
        match self.database_name.as_deref().filter(|d| !d.is_empty()) {
            Some(database) => Some(format!("{database}/{collection}")),
            None => Some(collection.to_string()),
        }
    }

    fn record_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn partition(&self) -> Option<&str> {
        self.partition_key.as_deref().filter(|p| !p.is_empty())
    }

    fn connection(&self) -> Option<&str> {
        self.connection_setting.as_deref()
    }

    fn create_if_not_exists(&self) -> bool {
        self.create_if_not_exists
    }

    fn throughput(&self) -> Option<u32> {
        self.collection_throughput.filter(|t| *t > 0)
    }

    fn query(&self) -> Option<ParameterizedQuery> {
        self.sql_query.as_ref().map(|text| ParameterizedQuery {
            text: text.clone(),
            parameters: self.sql_parameters.clone(),
        })
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Upsert
    }

    fn options(options: &BindingOptions) -> &ConnectionOptions {
        &options.document
    }
}
