//! Attribute resolution
//!
//! The source attribute is never mutated. Resolution always produces a new
//! copy: once at registration (`%setting%`) and once per invocation
//! (`{token}`).

use tracing::debug;

use super::{bind_query_field, AttributeField, BindingAttribute, FieldPolicy, NameResolver};
use crate::binding::{BindingData, BindingTemplate};
use crate::error::BindError;
use crate::jsonpath::{self, Segment};

/// Resolve `%setting%` placeholders into a new copy.
///
/// App-setting fields keep the setting name so connection secrets never
/// land in the attribute; the setting only has to exist.
pub fn resolve_static<A: BindingAttribute>(
    attribute: &A,
    resolver: &dyn NameResolver,
) -> Result<A, BindError> {
    let mut resolved = attribute.clone();

    for field in resolved.fields_mut() {
        let AttributeField {
            name,
            value,
            policy,
        } = field;
        let Some(current) = value.as_deref() else {
            continue;
        };

        let next = match policy {
            FieldPolicy::AutoResolve | FieldPolicy::SqlQuery(_) => {
                resolver.resolve_whole_string(current)?
            }
            FieldPolicy::AppSetting if current.is_empty() => continue,
            FieldPolicy::AppSetting => {
                let setting = current.trim_matches('%');
                if resolver.resolve(setting).is_none() {
                    return Err(BindError::ConfigurationMissing {
                        setting: setting.to_string(),
                        reason: format!("referenced by {}.{name}", A::KIND),
                    });
                }
                setting.to_string()
            }
        };

        *value = Some(next);
    }

    Ok(resolved)
}

/// Per-parameter resolver for one attribute instance
#[derive(Debug, Clone)]
pub struct AttributeCloner<A: BindingAttribute> {
    name_resolved: A,
    tokens: Vec<String>,
}

impl<A: BindingAttribute> AttributeCloner<A> {
    /// Resolve settings and parse every templated field up front, so template
    /// syntax errors surface at registration
    pub fn new(attribute: &A, resolver: &dyn NameResolver) -> Result<Self, BindError> {
        let mut name_resolved = resolve_static(attribute, resolver)?;

        let mut tokens: Vec<String> = Vec::new();
        for field in name_resolved.fields_mut() {
            if !field.is_templated() {
                continue;
            }
            let Some(value) = field.value.as_deref() else {
                continue;
            };
            let template = BindingTemplate::parse(value)?;
            for token in template.parameter_names() {
                if !tokens.iter().any(|t| t == token) {
                    tokens.push(token.to_string());
                }
            }
        }

        debug!(kind = A::KIND, tokens = ?tokens, "Attribute resolved at registration");
        Ok(Self {
            name_resolved,
            tokens,
        })
    }

    /// The attribute after `%setting%` resolution
    pub fn name_resolved(&self) -> &A {
        &self.name_resolved
    }

    /// Distinct `{token}` names used by any field
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Check every token against the names a trigger provides.
    ///
    /// Dotted tokens are checked by their first segment.
    pub fn validate_contract(&self, contract: &[&str]) -> Result<(), BindError> {
        for token in &self.tokens {
            let head = match jsonpath::parse(token)?.into_iter().next() {
                Some(Segment::Field(head)) => head,
                _ => token.clone(),
            };
            if !contract.iter().any(|name| name.eq_ignore_ascii_case(&head)) {
                return Err(BindError::BindingDataMissing {
                    token: token.clone(),
                });
            }
        }
        Ok(())
    }

    /// Produce the fully resolved attribute for one invocation
    pub fn resolve_dynamic(&self, data: &BindingData) -> Result<A, BindError> {
        let mut resolved = self.name_resolved.clone();
        if self.tokens.is_empty() {
            return Ok(resolved);
        }

        for mut field in resolved.fields_mut() {
            if field.value.is_none() {
                continue;
            }
            if matches!(field.policy, FieldPolicy::SqlQuery(_)) {
                bind_query_field(&mut field, data)?;
            } else if field.is_templated() {
                let template = BindingTemplate::parse(field.value.as_deref().unwrap_or_default())?;
                if template.has_parameters() {
                    *field.value = Some(template.bind(data)?);
                }
            }
        }

        Ok(resolved)
    }

    /// Canonical string form of a resolved attribute
    pub fn invoke_string(&self, resolved: &A) -> Result<String, BindError> {
        Ok(serde_json::to_string(resolved)?)
    }

    /// Rebuild a resolved attribute from its invoke string
    pub fn from_invoke_string(&self, invoke_string: &str) -> Result<A, BindError> {
        serde_json::from_str(invoke_string).map_err(|e| BindError::InvalidInvokeString {
            details: format!("{} attribute: {e}", A::KIND),
        })
    }
}
