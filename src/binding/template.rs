//! Binding templates with caching
//!
//! A binding template is a string with `{token}` placeholders resolved against
//! per-invocation [`BindingData`]. Tokens may be dotted paths (`{order.id}`).
//! Literal braces are written `{{` and `}}`.
//!
//! Templates are tokenized once and cached; parsed token lists are shared
//! through `Arc` so a template bound on every invocation is never re-parsed.

use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;

use super::data::BindingData;
use super::validate::validate_token_name;
use crate::error::BindError;

/// Token representing a parsed template fragment
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal text (stores range in original string)
    Literal(Range<usize>),
    /// Escaped `{` or `}`
    Brace(char),
    /// `{name}` or `{name.path}`; `position` is the offset of the opening brace
    Param { name: String, position: usize },
}

/// Template tokenizer with caching
pub struct TemplateResolver {
    cache: DashMap<String, Arc<Vec<Token>>>,
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateResolver {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Parse template into tokens (with caching). Parse errors are not cached.
    pub fn tokenize(&self, template: &str) -> Result<Arc<Vec<Token>>, BindError> {
        if let Some(cached) = self.cache.get(template) {
            return Ok(Arc::clone(&cached));
        }

        let tokens = Arc::new(tokenize(template)?);
        self.cache.insert(template.to_string(), Arc::clone(&tokens));
        Ok(tokens)
    }

    /// Number of cached templates
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

fn tokenize(template: &str) -> Result<Vec<Token>, BindError> {
    let mut tokens = Vec::new();
    let mut chars = template.char_indices().peekable();
    let mut literal_start = 0;

    let flush = |tokens: &mut Vec<Token>, start: usize, end: usize| {
        if end > start {
            tokens.push(Token::Literal(start..end));
        }
    };

    while let Some((i, ch)) = chars.next() {
        match ch {
            '{' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                flush(&mut tokens, literal_start, i);
                chars.next();
                tokens.push(Token::Brace('{'));
                literal_start = i + 2;
            }
            '{' => {
                flush(&mut tokens, literal_start, i);

                let mut end = None;
                for (j, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            end = Some(j);
                            break;
                        }
                        '{' => {
                            return Err(BindError::TemplateParse {
                                position: j,
                                details: "nested '{' inside a token".to_string(),
                            })
                        }
                        _ => {}
                    }
                }

                let Some(end) = end else {
                    return Err(BindError::TemplateParse {
                        position: i,
                        details: "unclosed '{'".to_string(),
                    });
                };

                let name = &template[i + 1..end];
                validate_token_name(name, i)?;
                tokens.push(Token::Param {
                    name: name.to_string(),
                    position: i,
                });
                literal_start = end + 1;
            }
            '}' if chars.peek().map(|(_, c)| *c) == Some('}') => {
                flush(&mut tokens, literal_start, i);
                chars.next();
                tokens.push(Token::Brace('}'));
                literal_start = i + 2;
            }
            '}' => {
                return Err(BindError::TemplateParse {
                    position: i,
                    details: "unmatched '}' (write '}}' for a literal brace)".to_string(),
                });
            }
            _ => {}
        }
    }

    flush(&mut tokens, literal_start, template.len());
    Ok(tokens)
}

/// Global template resolver instance
pub static TEMPLATE_RESOLVER: Lazy<TemplateResolver> = Lazy::new(TemplateResolver::new);

/// A parsed binding template
#[derive(Debug, Clone)]
pub struct BindingTemplate {
    pattern: String,
    tokens: Arc<Vec<Token>>,
}

impl BindingTemplate {
    /// Parse through the global cache
    pub fn parse(pattern: &str) -> Result<Self, BindError> {
        Ok(Self {
            pattern: pattern.to_string(),
            tokens: TEMPLATE_RESOLVER.tokenize(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn has_parameters(&self) -> bool {
        self.tokens.iter().any(|t| matches!(t, Token::Param { .. }))
    }

    /// Distinct token names, in order of first appearance
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for token in self.tokens.iter() {
            if let Token::Param { name, .. } = token {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute every token with its value from binding data
    pub fn bind(&self, data: &BindingData) -> Result<String, BindError> {
        self.bind_with(|name| {
            let value = data.resolve(name)?;
            format_value(name, value)
        })
    }

    /// Substitute every token with the string produced by `lookup`
    pub fn bind_with<F>(&self, mut lookup: F) -> Result<String, BindError>
    where
        F: FnMut(&str) -> Result<String, BindError>,
    {
        let mut result = String::with_capacity(self.pattern.len() * 2);

        for token in self.tokens.iter() {
            match token {
                Token::Literal(range) => result.push_str(&self.pattern[range.clone()]),
                Token::Brace(brace) => result.push(*brace),
                Token::Param { name, .. } => result.push_str(&lookup(name)?),
            }
        }

        Ok(result)
    }
}

/// Render a resolved value for literal substitution
pub(crate) fn format_value(token: &str, value: &Value) -> Result<String, BindError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Err(BindError::BindingDataMissing {
            token: token.to_string(),
        }),
        other => Ok(other.to_string()),
    }
}

/// Bind a template string against binding data
pub fn bind(template: &str, data: &BindingData) -> Result<String, BindError> {
    BindingTemplate::parse(template)?.bind(data)
}

/// Distinct token names of a template, in order of first appearance
pub fn token_strings(template: &str) -> Result<Vec<String>, BindError> {
    let parsed = BindingTemplate::parse(template)?;
    Ok(parsed
        .parameter_names()
        .into_iter()
        .map(str::to_string)
        .collect())
}

/// Resolve one (possibly dotted) token to its value
pub fn resolve_token(token: &str, data: &BindingData) -> Result<Value, BindError> {
    data.resolve(token).cloned()
}
