//! Binding attributes
//!
//! An attribute is an ordinary typed value the function author attaches to a
//! parameter at registration. Its string fields may carry `%setting%` and
//! `{token}` placeholders; each field declares how it is resolved.
//!
//! - `cloner`: static and per-invocation resolution, invoke strings
//! - `name_resolver`: `%setting%` lookup
//! - `table` / `document`: the two store attribute kinds

mod cloner;
mod document;
mod name_resolver;
mod table;

pub use cloner::{resolve_static, AttributeCloner};
pub use document::DocumentAttribute;
pub use name_resolver::{EnvNameResolver, MapNameResolver, NameResolver};
pub use table::TableAttribute;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::binding::{template_bind, BindingData, BindingTemplate, ParameterizedQuery, SqlParameter};
use crate::config::{BindingOptions, ConnectionOptions};
use crate::error::BindError;
use crate::store::{ConnectionIdentity, WriteMode};

/// How one attribute field is resolved
#[derive(Debug)]
pub enum FieldPolicy<'a> {
    /// `%setting%` at registration, `{token}` on every invocation
    AutoResolve,
    /// The whole value names a setting, resolved at registration.
    /// An empty value stays empty (explicitly unset).
    AppSetting,
    /// `%setting%` at registration, then structured binding into query
    /// parameters on every invocation
    SqlQuery(&'a mut Vec<SqlParameter>),
}

/// Mutable view of one resolvable attribute field
#[derive(Debug)]
pub struct AttributeField<'a> {
    pub name: &'static str,
    pub value: &'a mut Option<String>,
    pub policy: FieldPolicy<'a>,
}

impl<'a> AttributeField<'a> {
    pub fn auto(name: &'static str, value: &'a mut Option<String>) -> Self {
        Self {
            name,
            value,
            policy: FieldPolicy::AutoResolve,
        }
    }

    pub fn app_setting(name: &'static str, value: &'a mut Option<String>) -> Self {
        Self {
            name,
            value,
            policy: FieldPolicy::AppSetting,
        }
    }

    pub fn sql_query(
        name: &'static str,
        value: &'a mut Option<String>,
        parameters: &'a mut Vec<SqlParameter>,
    ) -> Self {
        Self {
            name,
            value,
            policy: FieldPolicy::SqlQuery(parameters),
        }
    }

    /// Whether the field takes `{token}` placeholders
    pub fn is_templated(&self) -> bool {
        !matches!(self.policy, FieldPolicy::AppSetting)
    }
}

/// A declarative binding attached to a function parameter
pub trait BindingAttribute:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Attribute kind, used in diagnostics and registry lookup errors
    const KIND: &'static str;

    /// Every field that takes part in resolution, in a stable order
    fn fields_mut(&mut self) -> Vec<AttributeField<'_>>;
}

/// Structured template binding of a query field.
///
/// Rewrites the field to its `@param` form and stores the parameters in the
/// field's sink. Only [`FieldPolicy::SqlQuery`] fields have a sink.
pub fn bind_query_field(
    field: &mut AttributeField<'_>,
    data: &BindingData,
) -> Result<(), BindError> {
    let FieldPolicy::SqlQuery(parameters) = &mut field.policy else {
        return Err(BindError::NotSupported {
            operation: "structured template binding".to_string(),
            target: format!("field '{}'", field.name),
        });
    };

    let Some(pattern) = field.value.as_deref() else {
        return Err(BindError::ArgumentInvalid {
            name: field.name.to_string(),
            reason: "no query template to bind".to_string(),
        });
    };

    let query = template_bind(&BindingTemplate::parse(pattern)?, data)?;
    *field.value = Some(query.text);
    **parameters = query.parameters;
    Ok(())
}

/// Attributes that address a record store
pub trait StoreAttribute: BindingAttribute {
    /// Environment-style setting consulted when neither the attribute nor the
    /// options name a connection
    const DEFAULT_CONNECTION_SETTING: &'static str;

    /// Environment-style setting for the API key, for kinds that have one
    const DEFAULT_API_KEY_SETTING: Option<&'static str> = None;

    /// Table or collection id, when set on the attribute
    fn collection(&self) -> Option<String>;

    fn record_id(&self) -> Option<&str>;

    fn partition(&self) -> Option<&str> {
        None
    }

    /// Name of the setting holding the endpoint or connection string
    fn connection(&self) -> Option<&str>;

    /// Name of the setting holding the API key; `Some("")` means
    /// "explicitly no key"
    fn api_key(&self) -> Option<&str> {
        None
    }

    fn create_if_not_exists(&self) -> bool {
        false
    }

    /// Throughput hint for created collections; zero means unset
    fn throughput(&self) -> Option<u32> {
        None
    }

    fn query(&self) -> Option<ParameterizedQuery> {
        None
    }

    /// How collector writes reach the store
    fn write_mode(&self) -> WriteMode;

    /// This kind's section of the binding options
    fn options(options: &BindingOptions) -> &ConnectionOptions;

    /// Build the client cache key for a resolved connection
    fn identity(
        connection: String,
        api_key: Option<String>,
    ) -> Result<ConnectionIdentity, BindError> {
        Ok(ConnectionIdentity::new(connection, api_key))
    }
}
