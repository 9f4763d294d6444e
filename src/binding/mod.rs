//! Binding Module - template resolution against invocation data
//!
//! - `data`: per-invocation values (BindingData)
//! - `template`: `{token}` substitution with a shared parse cache
//! - `query`: structured binding into parameterized queries
//! - `validate`: token name rules
//!
//! Data flow:
//! ```text
//! attribute field "items/{order.id}"
//!                ↓
//!        BindingTemplate (parsed once, cached)
//!                ↓
//!   bind(BindingData)   or   template_bind(BindingData)
//!                ↓                      ↓
//!        "items/o-17"      "... = @order_id" + [@order_id = "o-17"]
//! ```

mod data;
mod query;
mod template;
mod validate;

pub use data::BindingData;
pub use query::{parameter_name, replacement_data, template_bind, ParameterizedQuery, SqlParameter};
pub use template::{
    bind, resolve_token, token_strings, BindingTemplate, TemplateResolver, Token,
    TEMPLATE_RESOLVER,
};
pub use validate::validate_token_name;
