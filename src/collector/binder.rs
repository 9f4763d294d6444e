//! Generic collector binding
//!
//! Adapts a backend's native collector (`AsyncCollector<M>`) to the shape a
//! function declared for its element type `T`:
//!
//! ```text
//! AsyncCollector<T>  →  backend collector (direct when T == M, else converting)
//! Collector<T>       →  buffered, replayed after the function returns
//! Out<T>             →  at most one value, replayed after the function returns
//! Out<Vec<T>>        →  every element, replayed in order
//! ```
//!
//! Every shape ends with exactly one flush of the backend collector, except
//! `Out` shapes the function never assigned.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{AsyncCollector, Collector, Converter, ConverterManager, ConvertingCollector, Out};
use crate::error::BindError;
use crate::param::Argument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorShape {
    Out,
    OutArray,
    Collector,
    AsyncCollector,
}

impl fmt::Display for CollectorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectorShape::Out => "Out",
            CollectorShape::OutArray => "OutArray",
            CollectorShape::Collector => "Collector",
            CollectorShape::AsyncCollector => "AsyncCollector",
        };
        f.write_str(name)
    }
}

/// Post-invocation step of a bound collector
#[async_trait]
pub trait CollectorCompletion: Send {
    /// Replay what the function produced into the backend collector and flush
    async fn complete(self: Box<Self>, argument: Argument) -> Result<(), BindError>;
}

/// Value for the function plus the step that finishes it
pub struct BoundCollector {
    pub argument: Argument,
    pub completion: Box<dyn CollectorCompletion>,
}

/// Prepared at registration for one (shape, T); builds a bound collector per invocation
pub trait CollectorBuilder<M>: Send + Sync {
    fn shape(&self) -> CollectorShape;

    fn build(&self, backend: Arc<dyn AsyncCollector<M>>) -> BoundCollector;
}

/// Prepare a builder for `shape` over element `T`, writing `M` to the backend.
///
/// Fails with `NoConverterFound` when `T != M` and no `T → M` converter is
/// registered.
pub fn bind_collector<T, M>(
    shape: CollectorShape,
    converters: &ConverterManager,
) -> Result<Arc<dyn CollectorBuilder<M>>, BindError>
where
    T: Send + Sync + 'static,
    M: Send + 'static,
{
    let direct = TypeId::of::<T>() == TypeId::of::<M>();
    let convert = if direct {
        identity::<T, M>()
    } else {
        converters.require::<T, M>()?
    };

    debug!(
        shape = %shape,
        element = type_name::<T>(),
        direct,
        "Prepared collector binding"
    );

    Ok(Arc::new(ShapeBuilder {
        shape,
        direct,
        convert,
    }))
}

/// Move a value between two type parameters that are the same type
fn cast<A: 'static, B: 'static>(value: A) -> Option<B> {
    let boxed: Box<dyn Any> = Box::new(value);
    boxed.downcast::<B>().ok().map(|b| *b)
}

fn identity<T: 'static, M: 'static>() -> Converter<T, M> {
    Arc::new(|item: T| {
        cast::<T, M>(item).ok_or(BindError::NoConverterFound {
            from: type_name::<T>(),
            to: type_name::<M>(),
        })
    })
}

struct ShapeBuilder<T, M> {
    shape: CollectorShape,
    direct: bool,
    convert: Converter<T, M>,
}

impl<T, M> CollectorBuilder<M> for ShapeBuilder<T, M>
where
    T: Send + Sync + 'static,
    M: Send + 'static,
{
    fn shape(&self) -> CollectorShape {
        self.shape
    }

    fn build(&self, backend: Arc<dyn AsyncCollector<M>>) -> BoundCollector {
        let argument = match self.shape {
            CollectorShape::AsyncCollector => {
                let wrapped = if self.direct {
                    cast::<Arc<dyn AsyncCollector<M>>, Arc<dyn AsyncCollector<T>>>(Arc::clone(
                        &backend,
                    ))
                } else {
                    None
                };
                let handle: Arc<dyn AsyncCollector<T>> = wrapped.unwrap_or_else(|| {
                    Arc::new(ConvertingCollector::new(
                        Arc::clone(&backend),
                        Arc::clone(&self.convert),
                    ))
                });
                return BoundCollector {
                    argument: Argument::new(handle),
                    completion: Box::new(FlushOnly { backend }),
                };
            }
            CollectorShape::Collector => Argument::new(Collector::<T>::new()),
            CollectorShape::Out => Argument::new(Out::<T>::new()),
            CollectorShape::OutArray => Argument::new(Out::<Vec<T>>::new()),
        };

        BoundCollector {
            argument,
            completion: Box::new(Replay {
                shape: self.shape,
                backend,
                convert: Arc::clone(&self.convert),
                _element: PhantomData,
            }),
        }
    }
}

/// The function wrote straight into the backend collector
struct FlushOnly<M> {
    backend: Arc<dyn AsyncCollector<M>>,
}

#[async_trait]
impl<M> CollectorCompletion for FlushOnly<M>
where
    M: Send + 'static,
{
    async fn complete(self: Box<Self>, _argument: Argument) -> Result<(), BindError> {
        self.backend.flush().await
    }
}

struct Replay<T, M> {
    shape: CollectorShape,
    backend: Arc<dyn AsyncCollector<M>>,
    convert: Converter<T, M>,
    _element: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, M> CollectorCompletion for Replay<T, M>
where
    T: Send + Sync + 'static,
    M: Send + 'static,
{
    async fn complete(self: Box<Self>, argument: Argument) -> Result<(), BindError> {
        let items: Vec<T> = match self.shape {
            CollectorShape::Collector => argument.downcast::<Collector<T>>()?.into_items(),
            CollectorShape::Out => match argument.downcast::<Out<T>>()?.into_inner() {
                Some(item) => vec![item],
                None => return Ok(()),
            },
            CollectorShape::OutArray => match argument.downcast::<Out<Vec<T>>>()?.into_inner() {
                Some(items) => items,
                None => return Ok(()),
            },
            CollectorShape::AsyncCollector => Vec::new(),
        };

        debug!(shape = %self.shape, count = items.len(), "Replaying collected values");
        for item in items {
            let message = (self.convert)(item)?;
            self.backend.add(message).await?;
        }
        self.backend.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{AsyncCollectorHandle, RecordingCollector};
    use serde_json::{json, Value};

    fn backend() -> Arc<RecordingCollector<Value>> {
        Arc::new(RecordingCollector::new())
    }

    #[tokio::test]
    async fn direct_async_collector_writes_to_backend() {
        let recording = backend();
        let builder = bind_collector::<Value, Value>(
            CollectorShape::AsyncCollector,
            &ConverterManager::new(),
        )
        .unwrap();

        let bound = builder.build(recording.clone());
        let handle = bound
            .argument
            .downcast_ref::<AsyncCollectorHandle<Value>>()
            .unwrap()
            .clone();
        handle.add(json!({"id": "1"})).await.unwrap();
        assert_eq!(recording.pending(), vec![json!({"id": "1"})]);

        bound.completion.complete(bound.argument).await.unwrap();
        assert_eq!(recording.flushes().len(), 1);
    }

    #[tokio::test]
    async fn out_array_flushes_once_in_order() {
        let recording = backend();
        let builder =
            bind_collector::<Value, Value>(CollectorShape::OutArray, &ConverterManager::new())
                .unwrap();

        let BoundCollector {
            mut argument,
            completion,
        } = builder.build(recording.clone());
        argument
            .downcast_mut::<Out<Vec<Value>>>()
            .unwrap()
            .set(vec![json!({"id": "a"}), json!({"id": "b"})]);

        completion.complete(argument).await.unwrap();
        assert_eq!(
            recording.flushes(),
            vec![vec![json!({"id": "a"}), json!({"id": "b"})]]
        );
    }

    #[tokio::test]
    async fn unassigned_out_writes_nothing() {
        let recording = backend();
        let builder =
            bind_collector::<Value, Value>(CollectorShape::Out, &ConverterManager::new()).unwrap();

        let bound = builder.build(recording.clone());
        bound.completion.complete(bound.argument).await.unwrap();
        assert!(recording.flushes().is_empty());
    }

    #[tokio::test]
    async fn sync_collector_converts_through_registered_converter() {
        let converters = ConverterManager::new();
        converters.add_converter(|n: u32| Ok(json!({ "n": n })));
        let recording = backend();
        let builder = bind_collector::<u32, Value>(CollectorShape::Collector, &converters).unwrap();

        let bound = builder.build(recording.clone());
        let collector = bound.argument.downcast_ref::<Collector<u32>>().unwrap();
        collector.add(1);
        collector.add(2);

        bound.completion.complete(bound.argument).await.unwrap();
        assert_eq!(
            recording.flushes(),
            vec![vec![json!({"n": 1}), json!({"n": 2})]]
        );
    }

    #[test]
    fn missing_converter_fails_at_bind_time() {
        let result = bind_collector::<u32, Value>(CollectorShape::Out, &ConverterManager::new());
        assert!(matches!(result, Err(BindError::NoConverterFound { .. })));
    }

    #[tokio::test]
    async fn wrong_argument_type_is_reported() {
        let builder =
            bind_collector::<Value, Value>(CollectorShape::Out, &ConverterManager::new()).unwrap();
        let bound = builder.build(backend());
        let err = bound
            .completion
            .complete(Argument::new(42u8))
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::TypeMismatch { .. }));
    }
}
