//! A data source evaluating statements over in-memory tables.
//!
//! Clauses apply in SQL order: the FROM clause with its joins, WHERE,
//! GROUP BY with aggregates, ORDER BY, window row numbers, the selection,
//! DISTINCT and finally OFFSET/LIMIT. Sorting is stable, so rows without
//! an ordering keep their table order.

use std::cmp::Ordering;
use std::collections::HashMap;

use strata_core::Value;
use tracing::trace;

use super::source::{DataSource, Row, RowSet};
use crate::chain::SetOperator;
use crate::error::{QueryError, QueryResult};
use crate::expr::{aggregate, binary, call_builtin, unary, Builtin};
use crate::sql::{JoinKind, OrderItem, SelectStatement, SqlExpr, SqlSource};

/// Prefix of helper columns (carried ordering, row numbers) that take no
/// part in DISTINCT.
const HELPER_PREFIX: &str = "__";

/// One row of a FROM clause: the row of every source alias in scope.
type Scope = Vec<(String, Row)>;

/// What an expression is evaluated against.
#[derive(Clone, Copy)]
enum Frame<'a> {
    /// A single source row.
    Row(&'a Scope),
    /// All source rows of one group.
    Group(&'a [Scope]),
}

/// Tables held in memory, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataSource {
    tables: HashMap<String, Vec<Row>>,
}

impl MemoryDataSource {
    /// Creates an empty data source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any table of the same name.
    #[must_use]
    pub fn with_table(mut self, name: impl Into<String>, rows: impl IntoIterator<Item = Row>) -> Self {
        self.tables.insert(name.into(), rows.into_iter().collect());
        self
    }

    /// Appends a row to a table, creating it if needed.
    pub fn insert(&mut self, table: impl Into<String>, row: Row) {
        self.tables.entry(table.into()).or_default().push(row);
    }

    /// The rows of a table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&[Row]> {
        self.tables.get(name).map(Vec::as_slice)
    }

    fn select(&self, statement: &SelectStatement) -> QueryResult<RowSet> {
        let mut scopes = self.scopes(&statement.source)?;
        if let Some(criteria) = &statement.criteria {
            let mut kept = Vec::with_capacity(scopes.len());
            for scope in scopes {
                if eval(criteria, Frame::Row(&scope), None)?.is_true() {
                    kept.push(scope);
                }
            }
            scopes = kept;
        }

        let grouped = !statement.group_by.is_empty()
            || statement.aggregation.is_some()
            || statement.selection.iter().any(|item| item.expr.has_aggregate());
        let groups: Vec<Vec<Scope>> = if grouped { group(scopes, &statement.group_by)? } else { vec![scopes] };
        let mut frames: Vec<Frame<'_>> = if grouped {
            groups.iter().map(|g| Frame::Group(g.as_slice())).collect()
        } else {
            groups.iter().flatten().map(Frame::Row).collect()
        };

        if !statement.order_by.is_empty() {
            frames = sort_frames(frames, &statement.order_by)?;
        }

        let numbers: Vec<Option<Vec<i64>>> = statement
            .selection
            .iter()
            .map(|item| match &item.expr {
                SqlExpr::RowNumber { order_by } => row_numbers(&frames, order_by).map(Some),
                _ => Ok(None),
            })
            .collect::<QueryResult<_>>()?;

        let columns: Vec<String> = statement.selection.iter().map(|item| item.alias.clone()).collect();
        let mut out = RowSet::new(columns);
        for (i, frame) in frames.iter().enumerate() {
            let projected = if statement.selection.is_empty() {
                match frame {
                    Frame::Row(scope) => scope.first().map(|(_, row)| row.clone()).unwrap_or_default(),
                    Frame::Group(_) => {
                        return Err(QueryError::DataSource("a grouped statement needs a selection".into()))
                    }
                }
            } else {
                let mut row = Row::new();
                for (item, numbered) in statement.selection.iter().zip(&numbers) {
                    let value = match numbered {
                        Some(numbers) => Value::Int(numbers[i]),
                        None => eval(&item.expr, *frame, None)?,
                    };
                    row.insert(item.alias.clone(), value);
                }
                row
            };
            out.rows.push(projected);
        }

        if statement.distinct {
            out.rows = distinct_rows(out.rows);
        }
        let skip = usize::try_from(statement.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let take = statement.take.map_or(usize::MAX, |t| usize::try_from(t).unwrap_or(usize::MAX));
        out.rows = out.rows.into_iter().skip(skip).take(take).collect();
        Ok(out)
    }

    fn scopes(&self, source: &SqlSource) -> QueryResult<Vec<Scope>> {
        match source {
            SqlSource::Table { name, alias } => {
                let rows = self
                    .tables
                    .get(name)
                    .ok_or_else(|| QueryError::DataSource(format!("unknown table '{name}'")))?;
                Ok(rows.iter().map(|row| vec![(alias.clone(), row.clone())]).collect())
            }
            SqlSource::Derived { statement, alias } => {
                let rows = self.select(statement)?.rows;
                Ok(rows.into_iter().map(|row| vec![(alias.clone(), row)]).collect())
            }
            SqlSource::Set { operator, left, right, alias } => {
                let left = self.select(left)?.rows;
                let right = self.select(right)?.rows;
                let rows = combine(*operator, left, right);
                Ok(rows.into_iter().map(|row| vec![(alias.clone(), row)]).collect())
            }
            SqlSource::Joined { base, joins } => {
                let mut scopes = self.scopes(base)?;
                for join in joins {
                    let inner = self.scopes(&join.source)?;
                    let mut joined = Vec::new();
                    for outer in scopes {
                        let mut matched = false;
                        for candidate in &inner {
                            let mut scope = outer.clone();
                            scope.extend(candidate.iter().cloned());
                            if eval(&join.on, Frame::Row(&scope), None)?.is_true() {
                                matched = true;
                                joined.push(scope);
                            }
                        }
                        if !matched && join.kind == JoinKind::LeftOuter {
                            let mut scope = outer;
                            scope.push((join.source.alias().to_owned(), Row::new()));
                            joined.push(scope);
                        }
                    }
                    scopes = joined;
                }
                Ok(scopes)
            }
        }
    }
}

impl DataSource for MemoryDataSource {
    fn execute(&self, statement: &SelectStatement) -> QueryResult<RowSet> {
        let rows = self.select(statement)?;
        trace!(statement = %statement, rows = rows.len(), "evaluated statement in memory");
        Ok(rows)
    }
}

fn group(scopes: Vec<Scope>, keys: &[SqlExpr]) -> QueryResult<Vec<Vec<Scope>>> {
    if keys.is_empty() {
        return Ok(vec![scopes]);
    }
    let mut groups: Vec<(Vec<Value>, Vec<Scope>)> = Vec::new();
    for scope in scopes {
        let key = keys.iter().map(|k| eval(k, Frame::Row(&scope), None)).collect::<QueryResult<Vec<_>>>()?;
        match groups.iter_mut().find(|(existing, _)| rows_match(existing, &key)) {
            Some((_, members)) => members.push(scope),
            None => groups.push((key, vec![scope])),
        }
    }
    Ok(groups.into_iter().map(|(_, members)| members).collect())
}

fn rows_match(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key_eq(y))
}

fn order_keys(frame: Frame<'_>, order_by: &[OrderItem]) -> QueryResult<Vec<Value>> {
    order_by.iter().map(|item| eval(&item.expr, frame, None)).collect()
}

fn compare_keys(a: &[Value], b: &[Value], order_by: &[OrderItem]) -> Ordering {
    for ((x, y), item) in a.iter().zip(b).zip(order_by) {
        let ordering = if item.descending { y.sort_cmp(x) } else { x.sort_cmp(y) };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sort_frames<'a>(frames: Vec<Frame<'a>>, order_by: &[OrderItem]) -> QueryResult<Vec<Frame<'a>>> {
    let mut keyed = frames
        .into_iter()
        .map(|frame| Ok((order_keys(frame, order_by)?, frame)))
        .collect::<QueryResult<Vec<_>>>()?;
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, order_by));
    Ok(keyed.into_iter().map(|(_, frame)| frame).collect())
}

/// `ROW_NUMBER()` of every frame under the window ordering.
fn row_numbers(frames: &[Frame<'_>], order_by: &[OrderItem]) -> QueryResult<Vec<i64>> {
    let keys = frames.iter().map(|frame| order_keys(*frame, order_by)).collect::<QueryResult<Vec<_>>>()?;
    let mut positions: Vec<usize> = (0..frames.len()).collect();
    positions.sort_by(|&a, &b| compare_keys(&keys[a], &keys[b], order_by));
    let mut numbers = vec![0; frames.len()];
    for (rank, position) in positions.into_iter().enumerate() {
        numbers[position] = i64::try_from(rank + 1).unwrap_or(i64::MAX);
    }
    Ok(numbers)
}

fn same_row(a: &Row, b: &Row) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka == kb && va.key_eq(vb))
}

fn distinct_rows(rows: Vec<Row>) -> Vec<Row> {
    let visible = |row: &Row| -> Row {
        row.iter().filter(|(k, _)| !k.starts_with(HELPER_PREFIX)).map(|(k, v)| (k.clone(), v.clone())).collect()
    };
    let mut seen: Vec<Row> = Vec::new();
    let mut out = Vec::new();
    for row in rows {
        let key = visible(&row);
        if !seen.iter().any(|s| same_row(s, &key)) {
            seen.push(key);
            out.push(row);
        }
    }
    out
}

fn combine(operator: SetOperator, left: Vec<Row>, right: Vec<Row>) -> Vec<Row> {
    let contains = |rows: &[Row], row: &Row| rows.iter().any(|r| same_row(r, row));
    match operator {
        SetOperator::Concat => left.into_iter().chain(right).collect(),
        SetOperator::Union => distinct_rows(left.into_iter().chain(right).collect()),
        SetOperator::Intersect => distinct_rows(left.into_iter().filter(|row| contains(&right, row)).collect()),
        SetOperator::Except => distinct_rows(left.into_iter().filter(|row| !contains(&right, row)).collect()),
    }
}

fn column(scope: &Scope, qualifier: Option<&str>, name: &str) -> QueryResult<Value> {
    match qualifier {
        Some(qualifier) => {
            let (_, row) = scope
                .iter()
                .find(|(alias, _)| alias == qualifier)
                .ok_or_else(|| QueryError::DataSource(format!("unknown source alias '{qualifier}'")))?;
            Ok(row.get(name).cloned().unwrap_or(Value::Null))
        }
        None => Ok(scope.iter().find_map(|(_, row)| row.get(name)).cloned().unwrap_or(Value::Null)),
    }
}

fn eval(expr: &SqlExpr, frame: Frame<'_>, row_number: Option<i64>) -> QueryResult<Value> {
    match expr {
        SqlExpr::Column { qualifier, name } => match frame {
            Frame::Row(scope) => column(scope, qualifier.as_deref(), name),
            Frame::Group(members) => match members.first() {
                Some(first) => column(first, qualifier.as_deref(), name),
                None => Ok(Value::Null),
            },
        },
        SqlExpr::Literal(value) => Ok(value.clone()),
        SqlExpr::Binary { left, op, right } => {
            binary(*op, &eval(left, frame, row_number)?, &eval(right, frame, row_number)?)
        }
        SqlExpr::Unary { op, operand } => unary(*op, &eval(operand, frame, row_number)?),
        SqlExpr::Function { name, args } => {
            let builtin = Builtin::parse(name)
                .ok_or_else(|| QueryError::DataSource(format!("unknown function '{name}'")))?;
            let args = args.iter().map(|a| eval(a, frame, row_number)).collect::<QueryResult<Vec<_>>>()?;
            call_builtin(builtin, &args)
        }
        SqlExpr::Aggregate { function, arg, distinct } => {
            let Frame::Group(members) = frame else {
                return Err(QueryError::DataSource(format!("{function} outside of a grouped statement")));
            };
            let Some(arg) = arg else {
                return Ok(Value::Int(i64::try_from(members.len()).unwrap_or(i64::MAX)));
            };
            let mut values = Vec::with_capacity(members.len());
            for scope in members {
                let value = eval(arg, Frame::Row(scope), None)?;
                if value.is_null() || (*distinct && values.iter().any(|v: &Value| v.key_eq(&value))) {
                    continue;
                }
                values.push(value);
            }
            aggregate(function.builtin(), &values)
        }
        SqlExpr::RowNumber { .. } => row_number
            .map(Value::Int)
            .ok_or_else(|| QueryError::Unsupported("ROW_NUMBER() outside of a selection".into())),
        SqlExpr::Case { test, then, otherwise } => {
            if eval(test, frame, row_number)?.is_true() {
                eval(then, frame, row_number)
            } else {
                eval(otherwise, frame, row_number)
            }
        }
        SqlExpr::InList { expr, list, negated } => {
            let value = eval(expr, frame, row_number)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            let mut found = false;
            for candidate in list {
                if eval(candidate, frame, row_number)?.key_eq(&value) {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::row;
    use crate::expr::BinaryOp;
    use crate::sql::{AggregateFunction, Join, SelectItem};

    fn users() -> MemoryDataSource {
        MemoryDataSource::new().with_table(
            "users",
            (1..=5).map(|i| row([("id", Value::Int(i)), ("team", Value::Int(i % 2))])),
        )
    }

    fn select(columns: &[&str], alias: &str) -> Vec<SelectItem> {
        columns.iter().map(|c| SelectItem::new(SqlExpr::column(alias, *c), *c)).collect()
    }

    #[test]
    fn filters_sorts_and_pages() {
        let mut statement = SelectStatement::new(SqlSource::table("users", "t0"));
        statement.selection = select(&["id"], "t0");
        statement.criteria = Some(SqlExpr::binary(SqlExpr::column("t0", "id"), BinaryOp::Gt, SqlExpr::literal(1)));
        statement.order_by = vec![OrderItem::new(SqlExpr::column("t0", "id"), true)];
        statement.skip = Some(1);
        statement.take = Some(2);
        let rows = users().execute(&statement).expect("execute");
        let ids: Vec<&Value> = rows.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec![&Value::Int(4), &Value::Int(3)]);
    }

    #[test]
    fn groups_and_aggregates() {
        let mut statement = SelectStatement::new(SqlSource::table("users", "t0"));
        statement.group_by = vec![SqlExpr::column("t0", "team")];
        statement.selection = vec![
            SelectItem::new(SqlExpr::column("t0", "team"), "team"),
            SelectItem::new(SqlExpr::count_star(), "n"),
            SelectItem::new(SqlExpr::aggregate(AggregateFunction::Sum, SqlExpr::column("t0", "id")), "total"),
        ];
        let rows = users().execute(&statement).expect("execute");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows[0], row([("team", Value::Int(1)), ("n", Value::Int(3)), ("total", Value::Int(9))]));
    }

    #[test]
    fn scalar_aggregate_over_nothing_yields_one_row() {
        let mut statement = SelectStatement::new(SqlSource::table("users", "t0"));
        statement.criteria = Some(SqlExpr::literal(false));
        statement.selection = vec![SelectItem::new(SqlExpr::count_star(), "value")];
        let rows = users().execute(&statement).expect("execute");
        assert_eq!(rows.rows, vec![row([("value", Value::Int(0))])]);
    }

    #[test]
    fn left_joins_keep_unmatched_rows() {
        let source = users().with_table("teams", [row([("id", Value::Int(1)), ("name", Value::from("odd"))])]);
        let mut statement = SelectStatement::new(SqlSource::table("users", "t0").join(Join {
            kind: JoinKind::LeftOuter,
            source: SqlSource::table("teams", "j1"),
            on: SqlExpr::column("t0", "team").eq(SqlExpr::column("j1", "id")),
        }));
        statement.selection = vec![
            SelectItem::new(SqlExpr::column("t0", "id"), "id"),
            SelectItem::new(SqlExpr::column("j1", "name"), "name"),
        ];
        let rows = source.execute(&statement).expect("execute");
        assert_eq!(rows.len(), 5);
        assert_eq!(rows.rows[1]["name"], Value::Null);
        assert_eq!(rows.rows[0]["name"], Value::from("odd"));
    }

    #[test]
    fn row_numbers_follow_the_window_order() {
        let mut statement = SelectStatement::new(SqlSource::table("users", "t0"));
        statement.selection = vec![
            SelectItem::new(SqlExpr::column("t0", "id"), "id"),
            SelectItem::new(
                SqlExpr::RowNumber { order_by: vec![OrderItem::new(SqlExpr::column("t0", "id"), true)] },
                "__rn",
            ),
        ];
        let rows = users().execute(&statement).expect("execute");
        assert_eq!(rows.rows[0]["__rn"], Value::Int(5));
        assert_eq!(rows.rows[4]["__rn"], Value::Int(1));
    }

    #[test]
    fn distinct_ignores_helper_columns() {
        let mut statement = SelectStatement::new(SqlSource::table("users", "t0"));
        statement.selection = vec![
            SelectItem::new(SqlExpr::column("t0", "team"), "team"),
            SelectItem::new(SqlExpr::column("t0", "id"), "__o0"),
        ];
        statement.distinct = true;
        assert_eq!(users().execute(&statement).expect("execute").len(), 2);
    }

    #[test]
    fn unknown_tables_are_reported() {
        let statement = SelectStatement::new(SqlSource::table("ghosts", "t0"));
        let err = users().execute(&statement).expect_err("unknown table");
        assert!(matches!(err, QueryError::DataSource(ref m) if m.contains("ghosts")));
    }
}
