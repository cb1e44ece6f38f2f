//! Compute resource requirements

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Resource class name, e.g. `cpu` or `memory`
pub type ResourceName = String;

/// Compute resources requested and allowed for a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<ResourceName, Quantity>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<ResourceName, Quantity>,
}

impl ResourceRequirements {
    /// Adds a limit for a resource class
    pub fn with_limit(mut self, name: &str, quantity: &str) -> Self {
        self.limits.insert(name.to_string(), Quantity::from(quantity));
        self
    }

    /// Adds a request for a resource class
    pub fn with_request(mut self, name: &str, quantity: &str) -> Self {
        self.requests.insert(name.to_string(), Quantity::from(quantity));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// A resource amount such as `500m`, `1Gi` or `2`
///
/// Stored verbatim; `validate` checks the syntax.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(String);

const SUFFIXES: [&str; 15] = [
    "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "n", "u", "m", "k", "M", "G", "T", "P", "E",
];

impl Quantity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the quantity is a signed decimal number followed by an
    /// optional binary/decimal suffix or a decimal exponent
    pub fn validate(&self) -> Result<(), String> {
        let raw = self.0.trim();
        if raw.is_empty() {
            return Err("quantity is empty".to_string());
        }

        let unsigned = raw.strip_prefix(['+', '-']).unwrap_or(raw);
        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return Err(format!("'{}' does not start with a number", self.0));
        }

        if suffix.is_empty() || SUFFIXES.contains(&suffix) || is_exponent(suffix) {
            Ok(())
        } else {
            Err(format!("'{}' has an unknown suffix '{}'", self.0, suffix))
        }
    }
}

fn is_exponent(suffix: &str) -> bool {
    let Some(rest) = suffix.strip_prefix(['e', 'E']) else {
        return false;
    };
    let digits = rest.strip_prefix(['+', '-']).unwrap_or(rest);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

impl From<&str> for Quantity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Quantity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
