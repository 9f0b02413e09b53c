//! Variable interpolation for compose documents.
//!
//! Supported forms: `$VAR`, `${VAR}`, `${VAR:-default}`, `${VAR-default}`,
//! `${VAR:?message}`, `${VAR?message}` and `$$` for a literal dollar sign.
//! Interpolation applies to scalar values only, never to mapping keys.

use crate::error::{ConfigError, Result, StackError};
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};

const PATTERN: &str =
    r"\$(?:(\$)|\{([A-Za-z_][A-Za-z0-9_]*)(?:(:?[-?])([^}]*))?\}|([A-Za-z_][A-Za-z0-9_]*))";

/// Substitutes variables from a fixed environment.
#[derive(Debug)]
pub struct Interpolator<'a> {
    environment: &'a BTreeMap<String, String>,
    pattern: Regex,
    unset: BTreeSet<String>,
}

impl<'a> Interpolator<'a> {
    /// Creates an interpolator over `environment`.
    ///
    /// # Errors
    ///
    /// Returns an error if the substitution pattern fails to compile.
    pub fn new(environment: &'a BTreeMap<String, String>) -> Result<Self> {
        let pattern = Regex::new(PATTERN)
            .map_err(|e| StackError::internal(format!("invalid interpolation pattern: {e}")))?;
        Ok(Self {
            environment,
            pattern,
            unset: BTreeSet::new(),
        })
    }

    /// Interpolates every scalar string in `value` in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when a `:?`/`?` expression
    /// references a missing variable.
    pub fn apply(&mut self, value: &mut Value) -> Result<()> {
        match value {
            Value::String(text) => {
                let replaced = self.interpolate(text)?;
                *text = replaced;
            }
            Value::Sequence(items) => {
                for item in items {
                    self.apply(item)?;
                }
            }
            Value::Mapping(mapping) => {
                for (_, item) in mapping.iter_mut() {
                    self.apply(item)?;
                }
            }
            Value::Tagged(tagged) => self.apply(&mut tagged.value)?,
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
        Ok(())
    }

    /// Interpolates a single string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] for a failed `:?`/`?` expression.
    pub fn interpolate(&mut self, input: &str) -> Result<String> {
        let mut output = String::with_capacity(input.len());
        let mut last = 0;

        for caps in self.pattern.captures_iter(input) {
            let Some(whole) = caps.get(0) else { continue };
            output.push_str(&input[last..whole.start()]);
            last = whole.end();

            if caps.get(1).is_some() {
                output.push('$');
                continue;
            }

            let substituted = substitute(self.environment, &caps, &mut self.unset)?;
            output.push_str(&substituted);
        }

        output.push_str(&input[last..]);
        Ok(output)
    }

    /// Variables that were referenced without a default and are not set.
    #[must_use]
    pub fn into_unset(self) -> BTreeSet<String> {
        self.unset
    }
}

fn substitute(
    environment: &BTreeMap<String, String>,
    caps: &Captures<'_>,
    unset: &mut BTreeSet<String>,
) -> Result<String> {
    let name = caps
        .get(2)
        .or_else(|| caps.get(5))
        .map_or("", |m| m.as_str());
    let value = environment.get(name);
    let argument = caps.get(4).map_or("", |m| m.as_str());

    let resolved = match caps.get(3).map(|m| m.as_str()) {
        Some(":-") => value.filter(|v| !v.is_empty()).map_or(argument, String::as_str),
        Some("-") => value.map_or(argument, String::as_str),
        Some(":?") => match value.filter(|v| !v.is_empty()) {
            Some(v) => v.as_str(),
            None => return Err(missing(name)),
        },
        Some("?") => match value {
            Some(v) => v.as_str(),
            None => return Err(missing(name)),
        },
        _ => match value {
            Some(v) => v.as_str(),
            None => {
                unset.insert(name.to_string());
                ""
            }
        },
    };

    Ok(resolved.to_string())
}

fn missing(name: &str) -> StackError {
    ConfigError::MissingEnvVar {
        name: name.to_string(),
    }
    .into()
}
