//! Worker option schemas.
//!
//! Every worker declares its recognized options as a list of
//! [`OptionDef`]s: name, type, default, and a help line that doubles as
//! user documentation. The supplied config map is validated against the
//! schema once, at worker construction:
//!
//! - unknown keys are fatal (a typo must not silently no-op),
//! - missing keys take the default,
//! - wrong types are fatal,
//! - integers outside their declared range are clamped with a warning
//!   (the normalization step),
//! - enum values outside the declared set are fatal.
//!
//! The result is an [`Options`] map the worker can read with infallible
//! typed getters; by then every key is present with the declared type.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::config::ConfigError;

#[derive(Debug, Clone)]
pub enum OptionKind {
    Bool,
    Int { min: Option<i64>, max: Option<i64> },
    Float,
    Str,
    Enum(&'static [&'static str]),
    List,
}

impl OptionKind {
    fn expected(&self) -> String {
        match self {
            OptionKind::Bool => "a boolean".to_string(),
            OptionKind::Int { min, max } => match (min, max) {
                (Some(min), Some(max)) => format!("an integer in {min}..={max}"),
                (Some(min), None) => format!("an integer >= {min}"),
                (None, Some(max)) => format!("an integer <= {max}"),
                (None, None) => "an integer".to_string(),
            },
            OptionKind::Float => "a number".to_string(),
            OptionKind::Str => "a string".to_string(),
            OptionKind::Enum(allowed) => format!("one of {allowed:?}"),
            OptionKind::List => "an array".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptionDef {
    pub name: &'static str,
    pub kind: OptionKind,
    pub default: Value,
    pub help: &'static str,
}

impl OptionDef {
    pub fn bool(name: &'static str, default: bool, help: &'static str) -> Self {
        OptionDef {
            name,
            kind: OptionKind::Bool,
            default: Value::Bool(default),
            help,
        }
    }

    pub fn int(
        name: &'static str,
        default: i64,
        min: Option<i64>,
        max: Option<i64>,
        help: &'static str,
    ) -> Self {
        OptionDef {
            name,
            kind: OptionKind::Int { min, max },
            default: Value::from(default),
            help,
        }
    }

    pub fn float(name: &'static str, default: f64, help: &'static str) -> Self {
        OptionDef {
            name,
            kind: OptionKind::Float,
            default: Value::from(default),
            help,
        }
    }

    pub fn enumerated(
        name: &'static str,
        default: &'static str,
        allowed: &'static [&'static str],
        help: &'static str,
    ) -> Self {
        OptionDef {
            name,
            kind: OptionKind::Enum(allowed),
            default: Value::from(default),
            help,
        }
    }

    pub fn list(name: &'static str, default: &[&str], help: &'static str) -> Self {
        OptionDef {
            name,
            kind: OptionKind::List,
            default: Value::Array(default.iter().map(|s| Value::from(*s)).collect()),
            help,
        }
    }
}

/// A validated, fully-defaulted option map for one worker instance.
#[derive(Debug, Clone, Default)]
pub struct Options {
    values: BTreeMap<String, Value>,
}

impl Options {
    pub fn empty() -> Self {
        Options::default()
    }

    /// Validate `supplied` against `defs`, producing the effective map.
    pub fn build(
        worker: &str,
        defs: &[OptionDef],
        supplied: &serde_json::Map<String, Value>,
    ) -> Result<Options, ConfigError> {
        let mut values: BTreeMap<String, Value> = defs
            .iter()
            .map(|def| (def.name.to_string(), def.default.clone()))
            .collect();

        for (key, value) in supplied {
            let def = defs.iter().find(|d| d.name == key.as_str()).ok_or_else(|| {
                ConfigError::UnknownOption {
                    worker: worker.to_string(),
                    option: key.clone(),
                }
            })?;
            // Null resets to the default, matching absent.
            if value.is_null() {
                continue;
            }
            let checked = check(worker, def, value)?;
            values.insert(key.clone(), checked);
        }

        Ok(Options { values })
    }

    pub fn get_bool(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(Value::Bool(b)) => *b,
            other => panic!("option `{name}` missing or not a bool: {other:?}"),
        }
    }

    pub fn get_int(&self, name: &str) -> i64 {
        match self.values.get(name).and_then(Value::as_i64) {
            Some(n) => n,
            None => panic!("option `{name}` missing or not an integer"),
        }
    }

    pub fn get_float(&self, name: &str) -> f64 {
        match self.values.get(name).and_then(Value::as_f64) {
            Some(n) => n,
            None => panic!("option `{name}` missing or not a number"),
        }
    }

    pub fn get_str(&self, name: &str) -> &str {
        match self.values.get(name).and_then(Value::as_str) {
            Some(s) => s,
            None => panic!("option `{name}` missing or not a string"),
        }
    }

    pub fn get_list(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            other => panic!("option `{name}` missing or not an array: {other:?}"),
        }
    }

    /// The effective map, for logging and the worker contract.
    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

fn check(worker: &str, def: &OptionDef, value: &Value) -> Result<Value, ConfigError> {
    let mismatch = || ConfigError::BadOptionType {
        worker: worker.to_string(),
        option: def.name.to_string(),
        expected: def.kind.expected(),
        got: value.to_string(),
    };

    match &def.kind {
        OptionKind::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        OptionKind::Int { min, max } => {
            let n = value.as_i64().ok_or_else(mismatch)?;
            let clamped = n.clamp(min.unwrap_or(i64::MIN), max.unwrap_or(i64::MAX));
            if clamped != n {
                warn!(
                    worker,
                    option = def.name,
                    value = n,
                    clamped, "option out of range, clamped"
                );
            }
            Ok(Value::from(clamped))
        }
        OptionKind::Float => {
            let n = value.as_f64().ok_or_else(mismatch)?;
            Ok(Value::from(n))
        }
        OptionKind::Str => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        OptionKind::Enum(allowed) => {
            let s = value.as_str().ok_or_else(mismatch)?;
            if allowed.contains(&s) {
                Ok(value.clone())
            } else {
                Err(mismatch())
            }
        }
        OptionKind::List => match value {
            Value::Array(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
    }
}
