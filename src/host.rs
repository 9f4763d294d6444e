//! Binding host - explicit function registration and invocation
//!
//! The host owns one [`RuleRegistry`] per attribute kind. Registering a
//! function binds each declared parameter through the registry of its
//! attribute's kind; invoking it runs every before hook, the body, then every
//! after hook.
//!
//! ```text
//! invoke(data, cx, body)
//!   ├─ before hooks (joined, values in declaration order)
//!   ├─ body(Arguments) -> Arguments
//!   └─ after hooks (declaration order, stop at first failure)
//!        └─ hand the value back into the returned Arguments
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use rustc_hash::FxHashMap;
use tracing::{debug, instrument};

use crate::attribute::BindingAttribute;
use crate::binding::BindingData;
use crate::context::InvocationContext;
use crate::error::BindError;
use crate::param::{Argument, ParamType, ParameterDescriptor};
use crate::registry::{ParameterBinding, RuleRegistry};
use crate::rules::{AfterInvoke, Bound};

#[derive(Default)]
pub struct BindingHost {
    registries: FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for BindingHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingHost")
            .field("registries", &self.registries.len())
            .finish()
    }
}

impl BindingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the registry for attribute kind `A`, replacing any previous one
    pub fn add_registry<A: BindingAttribute>(&mut self, registry: RuleRegistry<A>) {
        debug!(attribute = A::KIND, rules = ?registry.rule_names(), "Added rule registry");
        self.registries
            .insert(TypeId::of::<A>(), Arc::new(Arc::new(registry)));
    }

    pub fn registry<A: BindingAttribute>(&self) -> Result<Arc<RuleRegistry<A>>, BindError> {
        self.registries
            .get(&TypeId::of::<A>())
            .and_then(|entry| entry.downcast_ref::<Arc<RuleRegistry<A>>>())
            .cloned()
            .ok_or(BindError::UnknownAttribute { attribute: A::KIND })
    }

    pub fn function(&self, name: impl Into<String>) -> FunctionBuilder<'_> {
        FunctionBuilder {
            host: self,
            name: name.into(),
            contract: None,
            parameters: Vec::new(),
        }
    }
}

/// Registration of one function's parameters
pub struct FunctionBuilder<'h> {
    host: &'h BindingHost,
    name: String,
    contract: Option<Vec<String>>,
    parameters: Vec<Arc<dyn ParameterBinding>>,
}

impl FunctionBuilder<'_> {
    /// Names the trigger provides; tokens outside it fail at `build`
    pub fn with_contract<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contract = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Declare that parameter `name` of type `param_type` carries `attribute`
    pub fn bind<A: BindingAttribute>(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        attribute: A,
    ) -> Result<Self, BindError> {
        let parameter = ParameterDescriptor::new(name, param_type);
        if self
            .parameters
            .iter()
            .any(|p| p.parameter().name == parameter.name)
        {
            return Err(BindError::ArgumentInvalid {
                name: parameter.name,
                reason: format!("declared twice on function '{}'", self.name),
            });
        }

        let registry = self.host.registry::<A>()?;
        let binding = registry.resolve(&attribute, &parameter)?.ok_or_else(|| {
            parameter.reject(format!("no {} binding rule accepts this parameter", A::KIND))
        })?;

        self.parameters.push(Arc::new(binding));
        Ok(self)
    }

    pub fn build(self) -> Result<FunctionBindings, BindError> {
        if let Some(contract) = &self.contract {
            let names: Vec<&str> = contract.iter().map(String::as_str).collect();
            for parameter in &self.parameters {
                parameter.validate_contract(&names)?;
            }
        }

        debug!(
            function = %self.name,
            parameters = self.parameters.len(),
            "Function bindings built"
        );
        Ok(FunctionBindings {
            name: self.name,
            parameters: self.parameters,
        })
    }
}

/// Values handed to a function body, by parameter name
#[derive(Debug, Default)]
pub struct Arguments {
    values: FxHashMap<String, Argument>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Argument) {
        self.values.insert(name.into(), value);
    }

    pub fn get<T: Any>(&self, name: &str) -> Result<&T, BindError> {
        self.values.get(name).ok_or_else(|| missing(name))?.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self, name: &str) -> Result<&mut T, BindError> {
        self.values
            .get_mut(name)
            .ok_or_else(|| missing(name))?
            .downcast_mut()
    }

    /// Take a value out; the body must put it back for after hooks to see it
    pub fn take<T: Any>(&mut self, name: &str) -> Result<T, BindError> {
        self.remove(name)?.downcast()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn remove(&mut self, name: &str) -> Result<Argument, BindError> {
        self.values.remove(name).ok_or_else(|| missing(name))
    }
}

fn missing(name: &str) -> BindError {
    BindError::ArgumentInvalid {
        name: name.to_string(),
        reason: "no bound value with this name".to_string(),
    }
}

/// A registered function: its bound parameters in declaration order
pub struct FunctionBindings {
    name: String,
    parameters: Vec<Arc<dyn ParameterBinding>>,
}

impl fmt::Debug for FunctionBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBindings")
            .field("name", &self.name)
            .field("parameters", &self.parameter_names())
            .finish()
    }
}

impl FunctionBindings {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .map(|p| p.parameter().name.as_str())
            .collect()
    }

    /// Rule that bound `parameter`
    pub fn rule_for(&self, parameter: &str) -> Option<&'static str> {
        self.parameters
            .iter()
            .find(|p| p.parameter().name == parameter)
            .map(|p| p.rule())
    }

    /// Run one invocation against trigger data.
    ///
    /// The returned arguments hold each parameter's value after its after
    /// hook ran; output values are drained into their collectors and absent.
    #[instrument(skip_all, fields(function = %self.name, invocation = %cx.id()))]
    pub async fn invoke<F, Fut>(
        &self,
        data: &BindingData,
        cx: &InvocationContext,
        body: F,
    ) -> Result<Arguments, BindError>
    where
        F: FnOnce(Arguments) -> Fut,
        Fut: Future<Output = anyhow::Result<Arguments>>,
    {
        cx.check()?;
        let bound = try_join_all(self.parameters.iter().map(|p| p.bind(data, cx))).await?;
        self.run(bound, cx, body).await
    }

    /// Invoke string of every parameter, resolved against `data`
    pub fn invoke_strings(
        &self,
        data: &BindingData,
    ) -> Result<FxHashMap<String, String>, BindError> {
        self.parameters
            .iter()
            .map(|p| Ok((p.parameter().name.clone(), p.invoke_string(data)?)))
            .collect()
    }

    /// Replay an invocation from persisted invoke strings, without trigger data
    #[instrument(skip_all, fields(function = %self.name, invocation = %cx.id()))]
    pub async fn invoke_from_strings<F, Fut>(
        &self,
        invoke_strings: &FxHashMap<String, String>,
        cx: &InvocationContext,
        body: F,
    ) -> Result<Arguments, BindError>
    where
        F: FnOnce(Arguments) -> Fut,
        Fut: Future<Output = anyhow::Result<Arguments>>,
    {
        cx.check()?;
        let mut pending = Vec::with_capacity(self.parameters.len());
        for parameter in &self.parameters {
            let name = &parameter.parameter().name;
            let invoke_string = invoke_strings
                .get(name)
                .ok_or_else(|| BindError::InvalidInvokeString {
                    details: format!("no invoke string for parameter '{name}'"),
                })?;
            pending.push(parameter.bind_invoke_string(invoke_string, cx));
        }
        let bound = try_join_all(pending).await?;
        self.run(bound, cx, body).await
    }

    async fn run<F, Fut>(
        &self,
        bound: Vec<Bound>,
        cx: &InvocationContext,
        body: F,
    ) -> Result<Arguments, BindError>
    where
        F: FnOnce(Arguments) -> Fut,
        Fut: Future<Output = anyhow::Result<Arguments>>,
    {
        let mut arguments = Arguments::new();
        let mut after_hooks: Vec<(&str, Box<dyn AfterInvoke>)> =
            Vec::with_capacity(bound.len());
        for (parameter, bound) in self.parameters.iter().zip(bound) {
            let (value, after) = bound.into_parts();
            let name = parameter.parameter().name.as_str();
            arguments.insert(name, value);
            after_hooks.push((name, after));
        }

        debug!(parameters = after_hooks.len(), "Before hooks complete, running body");
        let mut returned = body(arguments)
            .await
            .map_err(|source| BindError::FunctionFailed {
                function: self.name.clone(),
                source,
            })?;

        for (name, after) in after_hooks {
            let value = returned.remove(name)?;
            if let Some(value) = after.on_after_invoke(value, cx).await? {
                returned.insert(name, value);
            }
        }
        Ok(returned)
    }
}
