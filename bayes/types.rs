// ========================================================================================
//                        Attribute and Outcome Value Objects
// ========================================================================================

// Types shared by training, prediction, reporting and the model artifact.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while constructing an [`Attribute`] or [`Outcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("A value is required but none was provided.")]
    MissingValue,

    #[error("Attributes require a non-empty namespace.")]
    MissingNamespace,

    #[error("Could not parse '{0}'. Expected NAMESPACE:VALUE or NAMESPACE:VALUE:QUALIFIER.")]
    Malformed(String),
}

/// A discrete observed signal, identified by namespace, value and an optional
/// qualifier. Equality, hashing and ordering use all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribute {
    namespace: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qualifier: Option<String>,
}

impl Attribute {
    pub fn builder() -> AttributeBuilder {
        AttributeBuilder::default()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.value)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, ":{qualifier}")?;
        }
        Ok(())
    }
}

/// Parses `NAMESPACE:VALUE` or `NAMESPACE:VALUE:QUALIFIER`. The qualifier may
/// itself contain colons.
impl FromStr for Attribute {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let (Some(namespace), Some(value)) = (parts.next(), parts.next()) else {
            return Err(BuildError::Malformed(s.to_string()));
        };
        let mut builder = Attribute::builder().namespace(namespace).value(value);
        if let Some(qualifier) = parts.next() {
            builder = builder.qualifier(qualifier);
        }
        builder.build()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttributeBuilder {
    namespace: Option<String>,
    value: Option<String>,
    qualifier: Option<String>,
}

impl AttributeBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// An empty qualifier is the same as no qualifier.
    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn build(self) -> Result<Attribute, BuildError> {
        let namespace = non_empty(self.namespace).ok_or(BuildError::MissingNamespace)?;
        let value = non_empty(self.value).ok_or(BuildError::MissingValue)?;
        Ok(Attribute {
            namespace,
            value,
            qualifier: non_empty(self.qualifier),
        })
    }
}

/// A discrete label being predicted. The namespace is optional; an absent
/// namespace is the default namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qualifier: Option<String>,
}

impl Outcome {
    pub fn builder() -> OutcomeBuilder {
        OutcomeBuilder::default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{namespace}:")?;
        }
        f.write_str(&self.value)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, ":{qualifier}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutcomeBuilder {
    namespace: Option<String>,
    value: Option<String>,
    qualifier: Option<String>,
}

impl OutcomeBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn build(self) -> Result<Outcome, BuildError> {
        let value = non_empty(self.value).ok_or(BuildError::MissingValue)?;
        Ok(Outcome {
            namespace: non_empty(self.namespace),
            value,
            qualifier: non_empty(self.qualifier),
        })
    }
}

/// Blank text counts as absent. Anything else is kept exactly as supplied.
fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|text| !text.trim().is_empty())
}
