/// Property paths as they arrive from a parsed filter expression
///
/// A path is a `/` separated list of (optionally prefixed) names, e.g.
/// `app:address/app:street`. A single attribute step such as `@gml:id`
/// addresses the feature identifier. Predicates, functions and axes other
/// than the implicit child axis are rejected.
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::MappingError;

/// Qualified name of a single path step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(prefix: Option<&str>, local: &str) -> Self {
        QName {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
        }
    }

    /// Parse `prefix:local` or `local`
    pub fn parse(name: &str) -> Result<Self, MappingError> {
        let name = name.trim();
        let (prefix, local) = match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, name),
        };
        if local.is_empty() || prefix.is_some_and(str::is_empty) {
            return Err(MappingError::InvalidPropertyPath(format!(
                "malformed name `{}`",
                name
            )));
        }
        if !local.chars().all(is_name_char) || !prefix.unwrap_or("").chars().all(is_name_char) {
            return Err(MappingError::InvalidPropertyPath(format!(
                "unsupported characters in step `{}`",
                name
            )));
        }
        Ok(QName::new(prefix, local))
    }

    /// Exact match: prefixes must agree when both sides carry one
    pub fn matches_exactly(&self, other: &QName) -> bool {
        self.local == other.local
            && match (&self.prefix, &other.prefix) {
                (Some(a), Some(b)) => a == b,
                (None, None) => true,
                _ => false,
            }
    }

    pub fn matches_local(&self, other: &QName) -> bool {
        self.local == other.local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// One step of a property path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathStep {
    Element(QName),
    Attribute(QName),
}

impl PathStep {
    pub fn name(&self) -> &QName {
        match self {
            PathStep::Element(name) | PathStep::Attribute(name) => name,
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Element(name) => write!(f, "{}", name),
            PathStep::Attribute(name) => write!(f, "@{}", name),
        }
    }
}

/// Ordered, non-empty sequence of steps locating a property value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyPath {
    steps: Vec<PathStep>,
}

impl PropertyPath {
    pub fn parse(path: &str) -> Result<Self, MappingError> {
        let trimmed = path.trim();
        let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(MappingError::InvalidPropertyPath(
                "empty property path".to_string(),
            ));
        }
        if trimmed.contains(['[', ']', '(', ')']) {
            return Err(MappingError::InvalidPropertyPath(format!(
                "predicates and functions are not supported: `{}`",
                path
            )));
        }

        let mut steps = Vec::new();
        for raw in trimmed.split('/') {
            if raw.trim().is_empty() {
                return Err(MappingError::InvalidPropertyPath(format!(
                    "empty step in `{}`",
                    path
                )));
            }
            let step = match raw.trim().strip_prefix('@') {
                Some(attr) => PathStep::Attribute(QName::parse(attr)?),
                None => PathStep::Element(QName::parse(raw)?),
            };
            steps.push(step);
        }

        if steps[..steps.len() - 1]
            .iter()
            .any(|s| matches!(s, PathStep::Attribute(_)))
        {
            return Err(MappingError::InvalidPropertyPath(format!(
                "attribute steps are only allowed last: `{}`",
                path
            )));
        }

        Ok(PropertyPath { steps })
    }

    /// Build a path from already parsed element names
    pub fn from_names<I, S>(names: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let steps = names
            .into_iter()
            .map(|n| QName::parse(n.as_ref()).map(PathStep::Element))
            .collect::<Result<Vec<_>, _>>()?;
        if steps.is_empty() {
            return Err(MappingError::InvalidPropertyPath(
                "empty property path".to_string(),
            ));
        }
        Ok(PropertyPath { steps })
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// `@gml:id`, `@id` and friends address the feature identifier
    pub fn is_identifier(&self) -> bool {
        matches!(self.steps.as_slice(), [PathStep::Attribute(name)] if name.local == "id")
    }

    /// Same path without its first step, if any steps remain
    pub(crate) fn without_first(&self) -> Option<PropertyPath> {
        if self.steps.len() < 2 {
            return None;
        }
        Some(PropertyPath {
            steps: self.steps[1..].to_vec(),
        })
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.steps.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", rendered.join("/"))
    }
}

impl std::str::FromStr for PropertyPath {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyPath::parse(s)
    }
}
