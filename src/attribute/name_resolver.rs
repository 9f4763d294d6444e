//! Setting name resolution for `%name%` placeholders
//!
//! Resolvers answer "what is the value of setting X" for registration-time
//! resolution and for environment-style connection defaults.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::BindError;

/// `%name%` placeholder inside an attribute field
static SETTING_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_.:\-]*)%").unwrap());

/// `.env` is loaded at most once per process
static DOTENV: Lazy<()> = Lazy::new(|| {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env for setting resolution");
    }
});

pub trait NameResolver: Send + Sync {
    /// Value of one setting, `None` when undefined
    fn resolve(&self, name: &str) -> Option<String>;

    /// Replace every `%name%` in `value`; fails on the first undefined setting
    fn resolve_whole_string(&self, value: &str) -> Result<String, BindError> {
        let mut result = String::with_capacity(value.len());
        let mut last = 0;

        for captures in SETTING_PATTERN.captures_iter(value) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let resolved =
                self.resolve(name.as_str())
                    .ok_or_else(|| BindError::ConfigurationMissing {
                        setting: name.as_str().to_string(),
                        reason: format!("'%{}%' is not defined", name.as_str()),
                    })?;
            result.push_str(&value[last..whole.start()]);
            result.push_str(&resolved);
            last = whole.end();
        }

        result.push_str(&value[last..]);
        Ok(result)
    }
}

/// Resolves settings from the process environment (after loading `.env`)
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvNameResolver;

impl EnvNameResolver {
    pub fn new() -> Self {
        Lazy::force(&DOTENV);
        Self
    }
}

impl NameResolver for EnvNameResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// In-memory settings
#[derive(Debug, Clone, Default)]
pub struct MapNameResolver {
    settings: FxHashMap<String, String>,
}

impl MapNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(name.into(), value.into());
    }
}

impl NameResolver for MapNameResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.settings.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapNameResolver {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            settings: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
