//! Binding rules
//!
//! A rule inspects a (statically resolved attribute, parameter) pair and
//! either rejects it (`Ok(None)`), fails registration (`Err`), or returns a
//! [`RuleBinder`] specialized for the parameter's element type. The binder
//! runs once per invocation: `on_before_invoke` produces the value handed to
//! the function together with the [`AfterInvoke`] step that receives the
//! value back.
//!
//! Store rule set, in resolution order:
//!
//! ```text
//! output      Out<T>, Out<Vec<T>>, Collector<T>, AsyncCollector<T>   (output)
//! query       Query<T>, Vec<T>
//! table       TableHandle
//! typed table TypedTable<T>
//! client      Client
//! item        Option<T>                                             (fallback)
//! ```

mod client;
mod item;
mod output;
mod query;
mod table;
mod validate;

pub use client::ClientRule;
pub use item::ItemRule;
pub use output::OutputRule;
pub use query::QueryRule;
pub use table::{TableRule, TypedTableRule};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::attribute::BindingAttribute;
use crate::context::InvocationContext;
use crate::error::BindError;
use crate::param::{Argument, ParameterDescriptor};

/// Where a rule sits in resolution order. Registration sorts stably by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RulePrecedence {
    /// Output-shaped rules, tried first
    Output,
    Normal,
    /// Tried last; at most one per attribute kind
    Fallback,
}

impl fmt::Display for RulePrecedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RulePrecedence::Output => "output",
            RulePrecedence::Normal => "normal",
            RulePrecedence::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

pub trait BindingRule<A: BindingAttribute>: Send + Sync {
    fn name(&self) -> &'static str;

    fn precedence(&self) -> RulePrecedence {
        RulePrecedence::Normal
    }

    /// Shape predicate plus specialization. Performs no I/O.
    fn get_rule_binder(
        &self,
        attribute: &A,
        parameter: &ParameterDescriptor,
    ) -> Result<Option<Arc<dyn RuleBinder<A>>>, BindError>;
}

#[async_trait]
pub trait RuleBinder<A: BindingAttribute>: Send + Sync {
    /// Produce the function's value from the invocation's resolved attribute
    async fn on_before_invoke(
        &self,
        attribute: &A,
        cx: &InvocationContext,
    ) -> Result<Bound, BindError>;
}

/// Post-invocation step, holding whatever the before hook captured
#[async_trait]
pub trait AfterInvoke: Send {
    /// Finish the binding with the value the function handed back.
    ///
    /// Returns the value for the caller, or `None` when the step consumed it.
    async fn on_after_invoke(
        self: Box<Self>,
        value: Argument,
        cx: &InvocationContext,
    ) -> Result<Option<Argument>, BindError>;
}

/// Nothing to do after the function returns
pub struct NoAfter;

#[async_trait]
impl AfterInvoke for NoAfter {
    async fn on_after_invoke(
        self: Box<Self>,
        value: Argument,
        _cx: &InvocationContext,
    ) -> Result<Option<Argument>, BindError> {
        Ok(Some(value))
    }
}

/// A bound value and its after step
pub struct Bound {
    value: Argument,
    after: Box<dyn AfterInvoke>,
}

impl fmt::Debug for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound").field("value", &self.value).finish()
    }
}

impl Bound {
    pub fn new(value: Argument, after: impl AfterInvoke + 'static) -> Self {
        Self {
            value,
            after: Box::new(after),
        }
    }

    /// Input-only value
    pub fn input(value: Argument) -> Self {
        Self::new(value, NoAfter)
    }

    pub fn value(&self) -> &Argument {
        &self.value
    }

    pub fn into_parts(self) -> (Argument, Box<dyn AfterInvoke>) {
        (self.value, self.after)
    }
}
