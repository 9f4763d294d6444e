//! Client rule: the raw store client, no record validation

use std::sync::Arc;

use async_trait::async_trait;

use super::validate::require_connection;
use super::{Bound, BindingRule, RuleBinder};
use crate::attribute::StoreAttribute;
use crate::context::InvocationContext;
use crate::error::BindError;
use crate::param::{Argument, ParamType, ParameterDescriptor};
use crate::store::StoreContextFactory;

#[derive(Debug, Clone)]
pub struct ClientRule {
    contexts: StoreContextFactory,
}

impl ClientRule {
    pub fn new(contexts: StoreContextFactory) -> Self {
        Self { contexts }
    }
}

impl<A: StoreAttribute> BindingRule<A> for ClientRule {
    fn name(&self) -> &'static str {
        "client"
    }

    fn get_rule_binder(
        &self,
        attribute: &A,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<Arc<dyn RuleBinder<A>>>, BindError> {
        if parameter.param_type != ParamType::Client {
            return Ok(None);
        }
        require_connection(&self.contexts, attribute)?;
        Ok(Some(Arc::new(ClientBinder {
            contexts: self.contexts.clone(),
        })))
    }
}

struct ClientBinder {
    contexts: StoreContextFactory,
}

#[async_trait]
impl<A: StoreAttribute> RuleBinder<A> for ClientBinder {
    async fn on_before_invoke(
        &self,
        attribute: &A,
        cx: &InvocationContext,
    ) -> Result<Bound, BindError> {
        cx.check()?;
        let identity = self.contexts.resolve_identity(attribute)?;
        let client = self.contexts.clients().get_or_create(&identity)?;
        Ok(Bound::input(Argument::new(client)))
    }
}
