//! Table rules: the untyped `TableHandle` and `TypedTable<T>`

use std::sync::Arc;

use async_trait::async_trait;

use super::validate::{require_connection, validate_item_type};
use super::{Bound, BindingRule, RuleBinder};
use crate::attribute::StoreAttribute;
use crate::context::InvocationContext;
use crate::error::BindError;
use crate::param::{Argument, ItemType, ParamType, ParameterDescriptor};
use crate::store::StoreContextFactory;

/// Binds `TableHandle` parameters. The attribute must name the table.
#[derive(Debug, Clone)]
pub struct TableRule {
    contexts: StoreContextFactory,
}

impl TableRule {
    pub fn new(contexts: StoreContextFactory) -> Self {
        Self { contexts }
    }
}

impl<A: StoreAttribute> BindingRule<A> for TableRule {
    fn name(&self) -> &'static str {
        "table"
    }

    fn get_rule_binder(
        &self,
        attribute: &A,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<Arc<dyn RuleBinder<A>>>, BindError> {
        if parameter.param_type != ParamType::RawTable {
            return Ok(None);
        }
        if attribute.collection().is_none() {
            return Err(
                parameter.reject("untyped tables need an explicit table or collection name")
            );
        }
        require_connection(&self.contexts, attribute)?;

        Ok(Some(Arc::new(TableBinder {
            contexts: self.contexts.clone(),
            item: None,
            implied: None,
        })))
    }
}

/// Binds `TypedTable<T>` parameters
#[derive(Debug, Clone)]
pub struct TypedTableRule {
    contexts: StoreContextFactory,
}

impl TypedTableRule {
    pub fn new(contexts: StoreContextFactory) -> Self {
        Self { contexts }
    }
}

impl<A: StoreAttribute> BindingRule<A> for TypedTableRule {
    fn name(&self) -> &'static str {
        "typed-table"
    }

    fn get_rule_binder(
        &self,
        attribute: &A,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<Arc<dyn RuleBinder<A>>>, BindError> {
        let ParamType::Table(item) = &parameter.param_type else {
            return Ok(None);
        };
        let implied = validate_item_type(attribute, parameter, item)?;
        require_connection(&self.contexts, attribute)?;

        Ok(Some(Arc::new(TableBinder {
            contexts: self.contexts.clone(),
            item: Some(item.clone()),
            implied,
        })))
    }
}

struct TableBinder {
    contexts: StoreContextFactory,
    item: Option<ItemType>,
    implied: Option<&'static str>,
}

#[async_trait]
impl<A: StoreAttribute> RuleBinder<A> for TableBinder {
    async fn on_before_invoke(
        &self,
        attribute: &A,
        cx: &InvocationContext,
    ) -> Result<Bound, BindError> {
        let table = self
            .contexts
            .create_context(attribute, self.implied, cx)?
            .table()?;

        let value = match &self.item {
            Some(item) => item.ops().typed_table(table),
            None => Argument::new(table),
        };
        Ok(Bound::input(value))
    }
}
