//! Item rule (fallback): look up one record by id, hand it to the function,
//! and persist it afterwards if the function changed it

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::validate::{require_connection, validate_item_type};
use super::{AfterInvoke, Bound, BindingRule, RuleBinder, RulePrecedence};
use crate::attribute::StoreAttribute;
use crate::context::InvocationContext;
use crate::error::BindError;
use crate::param::{Argument, ItemType, ParamType, ParameterDescriptor};
use crate::store::{StoreContextFactory, TableHandle};

#[derive(Debug, Clone)]
pub struct ItemRule {
    contexts: StoreContextFactory,
}

impl ItemRule {
    pub fn new(contexts: StoreContextFactory) -> Self {
        Self { contexts }
    }
}

impl<A: StoreAttribute> BindingRule<A> for ItemRule {
    fn name(&self) -> &'static str {
        "item"
    }

    fn precedence(&self) -> RulePrecedence {
        RulePrecedence::Fallback
    }

    fn get_rule_binder(
        &self,
        attribute: &A,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<Arc<dyn RuleBinder<A>>>, BindError> {
        let ParamType::Item(item) = &parameter.param_type else {
            return Ok(None);
        };

        let implied = validate_item_type(attribute, parameter, item)?;
        if attribute.record_id().map_or(true, str::is_empty) {
            return Err(BindError::ConfigurationMissing {
                setting: format!("{}.id", A::KIND),
                reason: format!(
                    "parameter '{}' binds a single record and needs an id",
                    parameter.name
                ),
            });
        }
        require_connection(&self.contexts, attribute)?;

        Ok(Some(Arc::new(ItemBinder {
            contexts: self.contexts.clone(),
            item: item.clone(),
            implied,
        })))
    }
}

struct ItemBinder {
    contexts: StoreContextFactory,
    item: ItemType,
    implied: Option<&'static str>,
}

#[async_trait]
impl<A: StoreAttribute> RuleBinder<A> for ItemBinder {
    async fn on_before_invoke(
        &self,
        attribute: &A,
        cx: &InvocationContext,
    ) -> Result<Bound, BindError> {
        let context = self.contexts.create_context(attribute, self.implied, cx)?;
        let id = context
            .record_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BindError::ArgumentInvalid {
                name: "id".to_string(),
                reason: format!("{} id resolved to an empty value", A::KIND),
            })?;
        let table = context.table()?;

        let fetched = table.lookup(&id).await?;
        if fetched.is_none() {
            debug!(collection = table.name(), id = %id, "Record not found, binding None");
        }
        let (value, snapshot) = self.item.ops().lookup_value(fetched)?;

        Ok(Bound::new(
            value,
            PersistChanges {
                table,
                item: self.item.clone(),
                id,
                snapshot,
            },
        ))
    }
}

/// Diff the returned record against the fetched snapshot and update on change
struct PersistChanges {
    table: TableHandle,
    item: ItemType,
    id: String,
    snapshot: Option<Value>,
}

#[async_trait]
impl AfterInvoke for PersistChanges {
    async fn on_after_invoke(
        self: Box<Self>,
        value: Argument,
        cx: &InvocationContext,
    ) -> Result<Option<Argument>, BindError> {
        let current = self.item.ops().returned_value(&value)?;
        self.persist(current, cx).await?;
        Ok(Some(value))
    }
}

impl PersistChanges {
    async fn persist(
        self,
        current: Option<Value>,
        cx: &InvocationContext,
    ) -> Result<(), BindError> {

        let (before, after) = match (self.snapshot, current) {
            (_, None) => return Ok(()),
            (None, Some(_)) => {
                warn!(
                    collection = self.table.name(),
                    id = %self.id,
                    "Record was absent and assigned by the function; \
                     item bindings do not create records"
                );
                return Ok(());
            }
            (Some(before), Some(after)) => (before, after),
        };

        if before == after {
            return Ok(());
        }

        if let Some(field) = self.item.id_field() {
            let original = field_ignore_case(&before, field);
            let updated = field_ignore_case(&after, field);
            if !same_identity(original, updated) {
                return Err(BindError::InvariantViolation {
                    details: format!(
                        "'{field}' of record '{}' in '{}' changed to {}",
                        self.id,
                        self.table.name(),
                        updated.map_or_else(|| "nothing".to_string(), Value::to_string)
                    ),
                });
            }
        }

        cx.check()?;
        debug!(collection = self.table.name(), id = %self.id, "Record changed, updating");
        self.table.update(after).await
    }
}

fn field_ignore_case<'v>(record: &'v Value, field: &str) -> Option<&'v Value> {
    let map = record.as_object()?;
    map.get(field).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(field))
            .map(|(_, value)| value)
    })
}

/// Ids compare case-insensitively when both are strings
fn same_identity(before: Option<&Value>, after: Option<&Value>) -> bool {
    match (before, after) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.eq_ignore_ascii_case(b),
        (a, b) => a == b,
    }
}
