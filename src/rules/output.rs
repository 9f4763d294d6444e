//! Output rule: collector-shaped parameters write through the store's
//! native collector and flush once after the function returns

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::validate::require_connection;
use super::{AfterInvoke, Bound, BindingRule, RuleBinder, RulePrecedence};
use crate::attribute::StoreAttribute;
use crate::collector::{AsyncCollector, CollectorBuilder, CollectorCompletion, ConverterManager};
use crate::context::InvocationContext;
use crate::error::BindError;
use crate::param::{Argument, ItemKind, ParameterDescriptor};
use crate::store::StoreContextFactory;

#[derive(Debug, Clone)]
pub struct OutputRule {
    contexts: StoreContextFactory,
    converters: ConverterManager,
}

impl OutputRule {
    pub fn new(contexts: StoreContextFactory, converters: ConverterManager) -> Self {
        Self {
            contexts,
            converters,
        }
    }
}

impl<A: StoreAttribute> BindingRule<A> for OutputRule {
    fn name(&self) -> &'static str {
        "output"
    }

    fn precedence(&self) -> RulePrecedence {
        RulePrecedence::Output
    }

    fn get_rule_binder(
        &self,
        attribute: &A,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<Arc<dyn RuleBinder<A>>>, BindError> {
        let (Some(shape), Some(item)) = (
            parameter.param_type.collector_shape(),
            parameter.param_type.element(),
        ) else {
            return Ok(None);
        };

        // Written records need no identity field; the backend may assign one
        let implied = match item.kind() {
            ItemKind::Record { .. } => Some(item.name()),
            _ if attribute.collection().is_some() => None,
            _ => {
                return Err(parameter.reject(
                    "schemaless and raw output needs an explicit table or collection name",
                ))
            }
        };

        require_connection(&self.contexts, attribute)?;
        let builder = item.ops().collector(shape, &self.converters)?;

        Ok(Some(Arc::new(OutputBinder {
            contexts: self.contexts.clone(),
            builder,
            implied,
        })))
    }
}

struct OutputBinder {
    contexts: StoreContextFactory,
    builder: Arc<dyn CollectorBuilder<Value>>,
    implied: Option<&'static str>,
}

#[async_trait]
impl<A: StoreAttribute> RuleBinder<A> for OutputBinder {
    async fn on_before_invoke(
        &self,
        attribute: &A,
        cx: &InvocationContext,
    ) -> Result<Bound, BindError> {
        let context = self.contexts.create_context(attribute, self.implied, cx)?;
        let backend: Arc<dyn AsyncCollector<Value>> = Arc::new(context.collector()?);
        let bound = self.builder.build(backend);
        Ok(Bound::new(
            bound.argument,
            Flush {
                completion: bound.completion,
            },
        ))
    }
}

struct Flush {
    completion: Box<dyn CollectorCompletion>,
}

#[async_trait]
impl AfterInvoke for Flush {
    async fn on_after_invoke(
        self: Box<Self>,
        value: Argument,
        cx: &InvocationContext,
    ) -> Result<Option<Argument>, BindError> {
        cx.check()?;
        // drained into the backend
        self.completion.complete(value).await?;
        Ok(None)
    }
}
