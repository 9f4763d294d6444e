//! Query rule: `Query<T>` hands the function an unexecuted query,
//! `Vec<T>` runs it before the function starts

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::validate::{require_connection, validate_item_type};
use super::{Bound, BindingRule, RuleBinder};
use crate::attribute::StoreAttribute;
use crate::context::InvocationContext;
use crate::error::BindError;
use crate::param::{ItemType, ParamType, ParameterDescriptor};
use crate::store::StoreContextFactory;

#[derive(Debug, Clone)]
pub struct QueryRule {
    contexts: StoreContextFactory,
}

impl QueryRule {
    pub fn new(contexts: StoreContextFactory) -> Self {
        Self { contexts }
    }
}

impl<A: StoreAttribute> BindingRule<A> for QueryRule {
    fn name(&self) -> &'static str {
        "query"
    }

    fn get_rule_binder(
        &self,
        attribute: &A,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<Arc<dyn RuleBinder<A>>>, BindError> {
        let (item, execute) = match &parameter.param_type {
            ParamType::Query(item) => (item, false),
            ParamType::Array(item) => (item, true),
            _ => return Ok(None),
        };

        let implied = validate_item_type(attribute, parameter, item)?;
        require_connection(&self.contexts, attribute)?;

        Ok(Some(Arc::new(QueryBinder {
            contexts: self.contexts.clone(),
            item: item.clone(),
            implied,
            execute,
        })))
    }
}

struct QueryBinder {
    contexts: StoreContextFactory,
    item: ItemType,
    implied: Option<&'static str>,
    execute: bool,
}

#[async_trait]
impl<A: StoreAttribute> RuleBinder<A> for QueryBinder {
    async fn on_before_invoke(
        &self,
        attribute: &A,
        cx: &InvocationContext,
    ) -> Result<Bound, BindError> {
        let context = self.contexts.create_context(attribute, self.implied, cx)?;
        let query = context.table()?.query().with_sql(context.query.clone());

        if !self.execute {
            return Ok(Bound::input(self.item.ops().query(query)));
        }

        let records = query.execute().await?;
        debug!(collection = query.table(), count = records.len(), "Query bound as array");
        Ok(Bound::input(self.item.ops().records(records)?))
    }
}
