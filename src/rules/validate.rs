//! Element type checks shared by the record-shaped rules

use crate::attribute::StoreAttribute;
use crate::error::BindError;
use crate::param::{ItemKind, ItemType, ParameterDescriptor};
use crate::store::StoreContextFactory;

/// Check `item` for a record-shaped binding and return the collection it
/// implies when the attribute names none.
///
/// - schemaless JSON needs an explicit table or collection name
/// - record types need an identity field and imply their own name
/// - raw payloads are rejected (they only bind to output collectors)
pub(crate) fn validate_item_type<A: StoreAttribute>(
    attribute: &A,
    parameter: &ParameterDescriptor,
    item: &ItemType,
) -> Result<Option<&'static str>, BindError> {
    match item.kind() {
        ItemKind::Json => match attribute.collection() {
            Some(_) => Ok(None),
            None => Err(parameter.reject(
                "schemaless records need an explicit table or collection name",
            )),
        },
        ItemKind::Record { id_field: None } => Err(parameter.reject(format!(
            "record type '{}' declares no identity field",
            item.name()
        ))),
        ItemKind::Record { .. } => Ok(Some(item.name())),
        ItemKind::Bytes | ItemKind::Text => Err(parameter.reject(
            "raw payloads bind only to Out, Collector and AsyncCollector parameters",
        )),
    }
}

/// Fail registration when no connection can be resolved for the attribute
pub(crate) fn require_connection<A: StoreAttribute>(
    contexts: &StoreContextFactory,
    attribute: &A,
) -> Result<(), BindError> {
    contexts.resolve_identity(attribute).map(|_| ())
}
