//! Select statements and their sources.

// Allow missing_const_for_fn - const fn with Vec isn't stable
#![allow(clippy::missing_const_for_fn)]

use std::fmt;

use serde::{Deserialize, Serialize};

use super::expr::write_list;
use super::{AggregateFunction, SqlExpr};
use crate::chain::SetOperator;

/// One projected column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    /// The projected expression.
    pub expr: SqlExpr,
    /// Output column name.
    pub alias: String,
}

impl SelectItem {
    /// Creates a select item.
    #[must_use]
    pub fn new(expr: SqlExpr, alias: impl Into<String>) -> Self {
        Self { expr, alias: alias.into() }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS {}", self.expr, self.alias)
    }
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Sort key.
    pub expr: SqlExpr,
    /// Descending when true.
    pub descending: bool,
}

impl OrderItem {
    #[must_use]
    pub const fn new(expr: SqlExpr, descending: bool) -> Self {
        Self { expr, descending }
    }

    /// The same key in the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self { expr: self.expr.clone(), descending: !self.descending }
    }
}

impl fmt::Display for OrderItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.expr, if self.descending { " DESC" } else { "" })
    }
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    /// INNER JOIN.
    Inner,
    /// LEFT OUTER JOIN.
    LeftOuter,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inner => "INNER JOIN",
            Self::LeftOuter => "LEFT JOIN",
        })
    }
}

/// A joined source with its condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    /// Join type.
    pub kind: JoinKind,
    /// The joined source.
    pub source: SqlSource,
    /// Join condition.
    pub on: SqlExpr,
}

/// The FROM clause of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlSource {
    /// A physical table.
    Table {
        /// Table name.
        name: String,
        /// Source alias.
        alias: String,
    },
    /// A nested statement.
    Derived {
        /// The nested statement.
        statement: Box<SelectStatement>,
        /// Source alias.
        alias: String,
    },
    /// Two statements combined by a set operator.
    Set {
        /// The operator.
        operator: SetOperator,
        /// Left operand.
        left: Box<SelectStatement>,
        /// Right operand.
        right: Box<SelectStatement>,
        /// Source alias.
        alias: String,
    },
    /// A base source followed by joins.
    Joined {
        /// The leftmost source.
        base: Box<SqlSource>,
        /// Joins in order.
        joins: Vec<Join>,
    },
}

impl SqlSource {
    /// A table source.
    #[must_use]
    pub fn table(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Table { name: name.into(), alias: alias.into() }
    }

    /// A derived source over `statement`.
    #[must_use]
    pub fn derived(statement: SelectStatement, alias: impl Into<String>) -> Self {
        Self::Derived { statement: Box::new(statement), alias: alias.into() }
    }

    /// The alias of the leftmost source.
    #[must_use]
    pub fn alias(&self) -> &str {
        match self {
            Self::Table { alias, .. } | Self::Derived { alias, .. } | Self::Set { alias, .. } => alias,
            Self::Joined { base, .. } => base.alias(),
        }
    }

    /// Appends a join, turning the source into a joined source if needed.
    #[must_use]
    pub fn join(self, join: Join) -> Self {
        match self {
            Self::Joined { base, mut joins } => {
                joins.push(join);
                Self::Joined { base, joins }
            }
            other => Self::Joined { base: Box::new(other), joins: vec![join] },
        }
    }

    /// Number of joins.
    #[must_use]
    pub fn join_count(&self) -> usize {
        match self {
            Self::Joined { joins, .. } => joins.len(),
            _ => 0,
        }
    }
}

impl fmt::Display for SqlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table { name, alias } => write!(f, "{name} {alias}"),
            Self::Derived { statement, alias } => write!(f, "({statement}) {alias}"),
            Self::Set { operator, left, right, alias } => {
                let keyword = match operator {
                    SetOperator::Concat => "UNION ALL",
                    SetOperator::Union => "UNION",
                    SetOperator::Intersect => "INTERSECT",
                    SetOperator::Except => "EXCEPT",
                };
                write!(f, "(({left}) {keyword} ({right})) {alias}")
            }
            Self::Joined { base, joins } => {
                write!(f, "{base}")?;
                for join in joins {
                    write!(f, " {} {} ON {}", join.kind, join.source, join.on)?;
                }
                Ok(())
            }
        }
    }
}

/// Marks a statement whose selection aggregates its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateTag {
    /// One row holding a single aggregate.
    Scalar(AggregateFunction),
    /// One row per GROUP BY key.
    Grouped,
}

/// A relational SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    /// FROM clause.
    pub source: SqlSource,
    /// Projected columns; empty projects every column of the base source.
    pub selection: Vec<SelectItem>,
    /// WHERE clause.
    pub criteria: Option<SqlExpr>,
    /// GROUP BY keys.
    pub group_by: Vec<SqlExpr>,
    /// ORDER BY keys.
    pub order_by: Vec<OrderItem>,
    /// SELECT DISTINCT.
    pub distinct: bool,
    /// Rows to skip.
    pub skip: Option<u64>,
    /// Maximum rows to return.
    pub take: Option<u64>,
    /// Aggregation marker.
    pub aggregation: Option<AggregateTag>,
}

impl SelectStatement {
    /// A statement reading every column of `source`.
    #[must_use]
    pub fn new(source: SqlSource) -> Self {
        Self {
            source,
            selection: Vec::new(),
            criteria: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            distinct: false,
            skip: None,
            take: None,
            aggregation: None,
        }
    }

    /// Adds a WHERE term, combined with AND.
    pub fn add_criteria(&mut self, criteria: SqlExpr) {
        self.criteria = Some(match self.criteria.take() {
            Some(existing) => existing.and(criteria),
            None => criteria,
        });
    }

    /// Returns true when skip or take is set.
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    /// Output column names.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.selection.iter().map(|item| item.alias.as_str()).collect()
    }

    /// Looks up a select item by output name.
    #[must_use]
    pub fn item(&self, alias: &str) -> Option<&SelectItem> {
        self.selection.iter().find(|item| item.alias == alias)
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        if self.selection.is_empty() {
            write!(f, "*")?;
        } else {
            write_list(f, &self.selection)?;
        }
        write!(f, " FROM {}", self.source)?;
        if let Some(criteria) = &self.criteria {
            write!(f, " WHERE {criteria}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            write_list(f, &self.group_by)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            write_list(f, &self.order_by)?;
        }
        if let Some(skip) = self.skip {
            write!(f, " OFFSET {skip}")?;
        }
        if let Some(take) = self.take {
            write!(f, " LIMIT {take}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_pseudo_sql() {
        let mut statement = SelectStatement::new(SqlSource::table("users", "t0").join(Join {
            kind: JoinKind::LeftOuter,
            source: SqlSource::table("teams", "j1"),
            on: SqlExpr::column("t0", "team_id").eq(SqlExpr::column("j1", "id")),
        }));
        statement.selection.push(SelectItem::new(SqlExpr::column("t0", "name"), "value"));
        statement.add_criteria(SqlExpr::column("j1", "name").eq(SqlExpr::literal("core")));
        statement.order_by.push(OrderItem::new(SqlExpr::column("t0", "id"), true));
        statement.take = Some(3);

        assert_eq!(
            statement.to_string(),
            "SELECT t0.name AS value FROM users t0 LEFT JOIN teams j1 ON (t0.team_id = j1.id) \
             WHERE (j1.name = 'core') ORDER BY t0.id DESC LIMIT 3"
        );
        assert_eq!(statement.source.alias(), "t0");
        assert_eq!(statement.source.join_count(), 1);
        assert_eq!(statement.columns(), vec!["value"]);
    }

    #[test]
    fn serializes_to_json() {
        let statement = SelectStatement::new(SqlSource::table("users", "t0"));
        let json = serde_json::to_string(&statement).expect("serialize");
        let back: SelectStatement = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, statement);
    }
}
