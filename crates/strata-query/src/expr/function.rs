//! Built-in functions known to both the translator and the evaluator.

use strata_core::HostType;

/// A function with a relational equivalent and an in-memory implementation.
///
/// Calls to any other name are looked up in the caller's
/// [`HostFunctions`](super::HostFunctions) at evaluation time and are never
/// translated to a relational expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Lower-cases a string.
    Lower,
    /// Upper-cases a string.
    Upper,
    /// Trims surrounding whitespace.
    Trim,
    /// Character length of a string.
    Length,
    /// Absolute value.
    Abs,
    /// First non-null argument.
    Coalesce,
    /// String concatenation.
    Concat,
    /// Substring test.
    Contains,
    /// Prefix test.
    StartsWith,
    /// Suffix test.
    EndsWith,
    /// Number of elements.
    Count,
    /// Sum of elements.
    Sum,
    /// Average of elements.
    Avg,
    /// Smallest element.
    Min,
    /// Largest element.
    Max,
}

impl Builtin {
    /// Resolves a lower-case function name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "trim" => Self::Trim,
            "length" | "len" => Self::Length,
            "abs" => Self::Abs,
            "coalesce" => Self::Coalesce,
            "concat" => Self::Concat,
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "count" => Self::Count,
            "sum" => Self::Sum,
            "avg" | "average" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        })
    }

    /// Canonical function name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Trim => "trim",
            Self::Length => "length",
            Self::Abs => "abs",
            Self::Coalesce => "coalesce",
            Self::Concat => "concat",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// Returns true for functions that fold a sequence into one value.
    #[must_use]
    pub const fn is_aggregate(self) -> bool {
        matches!(self, Self::Count | Self::Sum | Self::Avg | Self::Min | Self::Max)
    }

    /// Result type given the argument types.
    #[must_use]
    pub fn return_type(self, args: &[HostType]) -> HostType {
        let first = args.first().map(HostType::unwrap_optional);
        match self {
            Self::Lower | Self::Upper | Self::Trim | Self::Concat => HostType::String,
            Self::Length | Self::Count => HostType::Int,
            Self::Contains | Self::StartsWith | Self::EndsWith => HostType::Bool,
            Self::Avg => HostType::Float,
            Self::Abs => first.cloned().unwrap_or(HostType::Any),
            Self::Coalesce => args
                .iter()
                .find(|ty| **ty != HostType::Any)
                .map(|ty| ty.unwrap_optional().clone())
                .unwrap_or(HostType::Any),
            Self::Sum | Self::Min | Self::Max => match first {
                Some(HostType::Sequence(element)) => element.unwrap_optional().clone(),
                Some(other) => other.clone(),
                None => HostType::Any,
            },
        }
    }
}
