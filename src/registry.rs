//! Rule registry - ordered composite resolution for one attribute kind
//!
//! Rules are kept sorted by [`RulePrecedence`] (output, normal, fallback),
//! registration order preserved within a level. Resolution returns the first
//! rule that accepts the parameter, wrapped with the attribute's cloner.
//!
//! ```text
//! register(rule) ─► fallback already present? ─► DuplicateFallback
//!                └► stable sort by precedence
//! resolve(attr, param) ─► AttributeCloner::new (%setting%, template parse)
//!                      ─► rules[0..n].get_rule_binder ─► first Some
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::attribute::{AttributeCloner, BindingAttribute, NameResolver};
use crate::binding::BindingData;
use crate::context::InvocationContext;
use crate::error::BindError;
use crate::param::ParameterDescriptor;
use crate::rules::{Bound, BindingRule, RuleBinder, RulePrecedence};

pub struct RuleRegistry<A: BindingAttribute> {
    rules: Vec<Arc<dyn BindingRule<A>>>,
    resolver: Arc<dyn NameResolver>,
}

impl<A: BindingAttribute> fmt::Debug for RuleRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("attribute", &A::KIND)
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl<A: BindingAttribute> RuleRegistry<A> {
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        Self {
            rules: Vec::new(),
            resolver,
        }
    }

    pub fn register(&mut self, rule: Arc<dyn BindingRule<A>>) -> Result<&mut Self, BindError> {
        if rule.precedence() == RulePrecedence::Fallback {
            if let Some(existing) = self
                .rules
                .iter()
                .find(|r| r.precedence() == RulePrecedence::Fallback)
            {
                return Err(BindError::DuplicateFallback {
                    attribute: A::KIND,
                    first: existing.name(),
                    second: rule.name(),
                });
            }
        }

        debug!(
            attribute = A::KIND,
            rule = rule.name(),
            precedence = %rule.precedence(),
            "Registered binding rule"
        );
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.precedence());
        Ok(self)
    }

    /// Rule names in resolution order
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule accepting `parameter`, or `None` when no rule applies.
    ///
    /// Fails when the attribute cannot be statically resolved or when the
    /// accepting rule finds the binding invalid.
    #[instrument(skip_all, fields(attribute = A::KIND, parameter = %parameter.name))]
    pub fn resolve(
        &self,
        attribute: &A,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<RuleBinding<A>>, BindError> {
        let cloner = AttributeCloner::new(attribute, self.resolver.as_ref())?;

        for rule in &self.rules {
            let Some(binder) = rule.get_rule_binder(cloner.name_resolved(), parameter)? else {
                continue;
            };
            debug!(rule = rule.name(), param_type = %parameter.param_type, "Rule selected");
            return Ok(Some(RuleBinding {
                rule: rule.name(),
                parameter: parameter.clone(),
                cloner,
                binder,
            }));
        }

        debug!(param_type = %parameter.param_type, "No rule applies");
        Ok(None)
    }
}

/// A parameter bound to one rule: cloner plus specialized binder
pub struct RuleBinding<A: BindingAttribute> {
    rule: &'static str,
    parameter: ParameterDescriptor,
    cloner: AttributeCloner<A>,
    binder: Arc<dyn RuleBinder<A>>,
}

impl<A: BindingAttribute> fmt::Debug for RuleBinding<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBinding")
            .field("rule", &self.rule)
            .field("parameter", &self.parameter)
            .field("cloner", &self.cloner)
            .finish()
    }
}

impl<A: BindingAttribute> RuleBinding<A> {
    pub fn cloner(&self) -> &AttributeCloner<A> {
        &self.cloner
    }
}

/// Attribute-erased view of a bound parameter, as held by a function
#[async_trait]
pub trait ParameterBinding: Send + Sync {
    fn parameter(&self) -> &ParameterDescriptor;

    /// Name of the rule that accepted the parameter
    fn rule(&self) -> &'static str;

    fn attribute_kind(&self) -> &'static str;

    fn validate_contract(&self, contract: &[&str]) -> Result<(), BindError>;

    /// Invoke string of the attribute resolved against `data`
    fn invoke_string(&self, data: &BindingData) -> Result<String, BindError>;

    async fn bind(&self, data: &BindingData, cx: &InvocationContext) -> Result<Bound, BindError>;

    /// Bind from a persisted invoke string instead of trigger data
    async fn bind_invoke_string(
        &self,
        invoke_string: &str,
        cx: &InvocationContext,
    ) -> Result<Bound, BindError>;
}

#[async_trait]
impl<A: BindingAttribute> ParameterBinding for RuleBinding<A> {
    fn parameter(&self) -> &ParameterDescriptor {
        &self.parameter
    }

    fn rule(&self) -> &'static str {
        self.rule
    }

    fn attribute_kind(&self) -> &'static str {
        A::KIND
    }

    fn validate_contract(&self, contract: &[&str]) -> Result<(), BindError> {
        self.cloner.validate_contract(contract)
    }

    fn invoke_string(&self, data: &BindingData) -> Result<String, BindError> {
        let resolved = self.cloner.resolve_dynamic(data)?;
        self.cloner.invoke_string(&resolved)
    }

    async fn bind(&self, data: &BindingData, cx: &InvocationContext) -> Result<Bound, BindError> {
        let resolved = self.cloner.resolve_dynamic(data)?;
        self.binder.on_before_invoke(&resolved, cx).await
    }

    async fn bind_invoke_string(
        &self,
        invoke_string: &str,
        cx: &InvocationContext,
    ) -> Result<Bound, BindError> {
        let resolved = self.cloner.from_invoke_string(invoke_string)?;
        self.binder.on_before_invoke(&resolved, cx).await
    }
}
