//! Static type descriptors for query elements.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;

/// The static type of a value produced or consumed by a query operator.
///
/// Entity types are referenced by name and resolved through a
/// [`DomainModel`](crate::DomainModel); everything else is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostType {
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    String,
    /// Raw bytes.
    Bytes,
    /// A modeled entity, by entity type name.
    Entity(String),
    /// An ordered sequence of elements.
    Sequence(Box<HostType>),
    /// A group of elements sharing a key.
    Grouping {
        /// Type of the grouping key.
        key: Box<HostType>,
        /// Type of each grouped element.
        element: Box<HostType>,
    },
    /// An anonymous record of named fields (a "view").
    Record(Vec<(String, HostType)>),
    /// A value that may be null.
    Optional(Box<HostType>),
    /// Unknown or dynamically typed.
    Any,
}

impl HostType {
    /// Creates a sequence type.
    #[must_use]
    pub fn sequence(element: HostType) -> Self {
        Self::Sequence(Box::new(element))
    }

    /// Creates an entity type reference.
    #[must_use]
    pub fn entity(name: impl Into<String>) -> Self {
        Self::Entity(name.into())
    }

    /// Creates a grouping type.
    #[must_use]
    pub fn grouping(key: HostType, element: HostType) -> Self {
        Self::Grouping { key: Box::new(key), element: Box::new(element) }
    }

    /// Creates a record type.
    #[must_use]
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, HostType)>) -> Self {
        Self::Record(fields.into_iter().map(|(name, ty)| (name.into(), ty)).collect())
    }

    /// Returns the element type of a sequence.
    #[must_use]
    pub fn element_type(&self) -> Option<&HostType> {
        match self {
            Self::Sequence(element) => Some(element),
            Self::Optional(inner) => inner.element_type(),
            _ => None,
        }
    }

    /// Returns the entity name if this is (possibly optional) entity type.
    #[must_use]
    pub fn entity_name(&self) -> Option<&str> {
        match self {
            Self::Entity(name) => Some(name),
            Self::Optional(inner) => inner.entity_name(),
            _ => None,
        }
    }

    /// Looks up a field type of a record.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&HostType> {
        match self {
            Self::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, ty)| ty),
            Self::Optional(inner) => inner.field(name),
            _ => None,
        }
    }

    /// Strips one level of `Optional`.
    #[must_use]
    pub fn unwrap_optional(&self) -> &HostType {
        match self {
            Self::Optional(inner) => inner,
            other => other,
        }
    }

    /// Returns true for sequence types.
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        matches!(self.unwrap_optional(), Self::Sequence(_))
    }

    /// Returns true for scalar types that map onto a single column.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.unwrap_optional(),
            Self::Bool | Self::Int | Self::Float | Self::String | Self::Bytes
        )
    }

    /// Returns true for integer and float types.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self.unwrap_optional(), Self::Int | Self::Float)
    }

    /// Returns true when a value of `other` can flow where `self` is expected.
    ///
    /// `Any` is compatible with everything, `Optional` wrappers are ignored,
    /// integers widen to floats, and containers compare element-wise.
    #[must_use]
    pub fn accepts(&self, other: &HostType) -> bool {
        match (self.unwrap_optional(), other.unwrap_optional()) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Float, Self::Int) => true,
            (Self::Sequence(a), Self::Sequence(b)) => a.accepts(b),
            (
                Self::Grouping { key: ka, element: ea },
                Self::Grouping { key: kb, element: eb },
            ) => ka.accepts(kb) && ea.accepts(eb),
            (Self::Record(a), Self::Record(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((na, ta), (nb, tb))| na == nb && ta.accepts(tb))
            }
            (a, b) => a == b,
        }
    }

    /// Returns the host default value of this type.
    ///
    /// Value-like primitives default to their zero value; strings, bytes,
    /// entities, records and optional types default to null.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Sequence(_) => Value::Array(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Checks whether a runtime value inhabits this type.
    #[must_use]
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any | Self::Optional(_), Value::Null) => true,
            (Self::Optional(inner), v) => inner.admits(v),
            (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::String, Value::String(_))
            | (Self::Bytes, Value::Bytes(_)) => true,
            (Self::Entity(_) | Self::Record(_) | Self::Grouping { .. }, Value::Object(_)) => true,
            (Self::Sequence(element), Value::Array(items)) => items.iter().all(|v| element.admits(v)),
            _ => false,
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "Bool"),
            Self::Int => write!(f, "Int"),
            Self::Float => write!(f, "Float"),
            Self::String => write!(f, "String"),
            Self::Bytes => write!(f, "Bytes"),
            Self::Entity(name) => write!(f, "{name}"),
            Self::Sequence(element) => write!(f, "Seq<{element}>"),
            Self::Grouping { key, element } => write!(f, "Grouping<{key}, {element}>"),
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            Self::Optional(inner) => write!(f, "{inner}?"),
            Self::Any => write!(f, "Any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_of_sequence() {
        let users = HostType::sequence(HostType::entity("User"));
        assert_eq!(users.element_type(), Some(&HostType::entity("User")));
        assert!(users.is_sequence());
        assert_eq!(HostType::Int.element_type(), None);
    }

    #[test]
    fn defaults_follow_host_semantics() {
        assert_eq!(HostType::Int.default_value(), Value::Int(0));
        assert_eq!(HostType::String.default_value(), Value::Null);
        assert_eq!(HostType::entity("User").default_value(), Value::Null);
    }

    #[test]
    fn accepts_widens_and_ignores_optional() {
        assert!(HostType::Float.accepts(&HostType::Int));
        assert!(!HostType::Int.accepts(&HostType::Float));
        assert!(HostType::Optional(Box::new(HostType::String)).accepts(&HostType::String));
        assert!(HostType::Any.accepts(&HostType::entity("User")));
    }

    #[test]
    fn record_field_lookup() {
        let view = HostType::record([("name", HostType::String), ("age", HostType::Int)]);
        assert_eq!(view.field("age"), Some(&HostType::Int));
        assert_eq!(view.to_string(), "{name: String, age: Int}");
    }

    #[test]
    fn admits_runtime_values() {
        assert!(HostType::Int.admits(&Value::Int(1)));
        assert!(!HostType::Int.admits(&Value::Null));
        assert!(HostType::Optional(Box::new(HostType::Int)).admits(&Value::Null));
    }
}
