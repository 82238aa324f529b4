//! Lambda text front end.
//!
//! Lambdas can be written as text such as `x => x.total > 100 AND
//! lower(x.name) LIKE 'a%'`. The parameter list is split off here and the
//! body is parsed with `sqlparser`'s expression grammar, then converted into
//! an [`Expr`]: compound identifiers rooted at a parameter become member
//! chains, literals become constants and calls keep their lower-cased name.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use strata_core::{DomainModel, HostType, Value};

use super::{BinaryOp, Expr, Lambda, Param};
use crate::error::{QueryError, QueryResult};

/// A lambda whose parameter types are not known yet.
///
/// The parser binds parameter types from the operator the lambda is passed
/// to, then infers the return type against the domain model.
#[derive(Debug, Clone, PartialEq)]
pub struct UntypedLambda {
    params: Vec<String>,
    body: Expr,
}

impl UntypedLambda {
    /// Creates an untyped lambda from parameter names and a body.
    #[must_use]
    pub fn new<S: Into<String>>(params: impl IntoIterator<Item = S>, body: Expr) -> Self {
        Self { params: params.into_iter().map(Into::into).collect(), body }
    }

    /// Parses `params => body` text.
    ///
    /// `params` is a single identifier or a parenthesized, comma separated
    /// list.
    pub fn parse(text: &str) -> QueryResult<Self> {
        let (head, body) = text
            .split_once("=>")
            .ok_or_else(|| QueryError::illegal(text, "expected 'params => body'"))?;
        let head = head.trim();
        let head = head.strip_prefix('(').and_then(|h| h.strip_suffix(')')).unwrap_or(head);
        let params: Vec<String> = head
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect();
        if let Some(bad) = params.iter().find(|p| !is_identifier(p)) {
            return Err(QueryError::illegal(text, format!("'{bad}' is not a parameter name")));
        }
        let body = parse_body(body.trim(), &params)?;
        Ok(Self { params, body })
    }

    /// Parameter names.
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// The body expression.
    #[must_use]
    pub const fn body(&self) -> &Expr {
        &self.body
    }

    /// Assigns parameter types and infers the return type.
    pub fn bind(&self, types: &[HostType], model: &dyn DomainModel) -> QueryResult<Lambda> {
        if types.len() != self.params.len() {
            return Err(QueryError::illegal(
                &self.body,
                format!("expected {} parameters, got {}", types.len(), self.params.len()),
            ));
        }
        let params =
            self.params.iter().zip(types).map(|(name, ty)| Param::new(name.clone(), ty.clone())).collect();
        Lambda::typed(params, self.body.clone(), model)
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Parses an expression body in which `params` are the bound parameters.
pub(crate) fn parse_body(text: &str, params: &[String]) -> QueryResult<Expr> {
    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect).try_with_sql(text)?;
    let expr = parser.parse_expr()?;
    parser.expect_token(&Token::EOF)?;
    Converter { params }.convert(expr).map_err(|err| match err {
        QueryError::IllegalExpression { reason, .. } => QueryError::illegal(text, reason),
        other => other,
    })
}

struct Converter<'a> {
    params: &'a [String],
}

impl Converter<'_> {
    fn convert(&self, expr: sp::Expr) -> QueryResult<Expr> {
        match expr {
            sp::Expr::Identifier(ident) => self.root(&ident.value),
            sp::Expr::CompoundIdentifier(idents) => {
                let mut parts = idents.into_iter();
                let root = parts
                    .next()
                    .ok_or_else(|| QueryError::illegal("", "empty identifier"))?;
                let root = self.root(&root.value)?;
                Ok(parts.fold(root, |target, ident| target.member(ident.value)))
            }
            sp::Expr::Value(value) => convert_value(value.value).map(Expr::Constant),
            sp::Expr::BinaryOp { left, op, right } => {
                let op = convert_binary_op(&op)?;
                Ok(Expr::Binary {
                    left: Box::new(self.convert(*left)?),
                    op,
                    right: Box::new(self.convert(*right)?),
                })
            }
            sp::Expr::UnaryOp { op, expr } => {
                let operand = self.convert(*expr)?;
                match op {
                    sp::UnaryOperator::Not => Ok(operand.not()),
                    sp::UnaryOperator::Plus => Ok(operand),
                    sp::UnaryOperator::Minus => Ok(match operand {
                        Expr::Constant(Value::Int(i)) => Expr::int(-i),
                        Expr::Constant(Value::Float(f)) => Expr::Constant(Value::Float(-f)),
                        other => other.neg(),
                    }),
                    other => Err(QueryError::Unsupported(format!("unary operator {other}"))),
                }
            }
            sp::Expr::Nested(inner) => self.convert(*inner),
            sp::Expr::IsNull(inner) => Ok(self.convert(*inner)?.is_null()),
            sp::Expr::IsNotNull(inner) => Ok(self.convert(*inner)?.is_not_null()),
            sp::Expr::Like { negated, expr, pattern, .. } => {
                let like = self.convert(*expr)?.like(self.convert(*pattern)?);
                Ok(if negated { like.not() } else { like })
            }
            sp::Expr::InList { expr, list, negated } => Ok(Expr::InList {
                expr: Box::new(self.convert(*expr)?),
                list: list.into_iter().map(|e| self.convert(e)).collect::<QueryResult<_>>()?,
                negated,
            }),
            sp::Expr::Between { expr, negated, low, high } => {
                let expr = self.convert(*expr)?;
                let between = expr.clone().gt_eq(self.convert(*low)?).and(expr.lt_eq(self.convert(*high)?));
                Ok(if negated { between.not() } else { between })
            }
            sp::Expr::Case { operand: None, conditions, else_result, .. } => {
                let otherwise = match else_result {
                    Some(e) => self.convert(*e)?,
                    None => Expr::null(),
                };
                conditions.into_iter().rev().try_fold(otherwise, |otherwise, case_when| {
                    Ok(Expr::conditional(
                        self.convert(case_when.condition)?,
                        self.convert(case_when.result)?,
                        otherwise,
                    ))
                })
            }
            sp::Expr::Function(func) => {
                let function = func.name.to_string().to_lowercase();
                let args = self.convert_args(func.args)?;
                Ok(Expr::call(function, args))
            }
            other => Err(QueryError::Unsupported(format!("expression '{other}'"))),
        }
    }

    fn root(&self, name: &str) -> QueryResult<Expr> {
        if self.params.iter().any(|p| p == name) {
            Ok(Expr::param(name))
        } else {
            Err(QueryError::illegal(name, format!("'{name}' is not a lambda parameter")))
        }
    }

    fn convert_args(&self, args: sp::FunctionArguments) -> QueryResult<Vec<Expr>> {
        match args {
            sp::FunctionArguments::None => Ok(Vec::new()),
            sp::FunctionArguments::Subquery(_) => {
                Err(QueryError::Unsupported("subquery function argument".to_string()))
            }
            sp::FunctionArguments::List(arg_list) => arg_list
                .args
                .into_iter()
                .map(|arg| match arg {
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e))
                    | sp::FunctionArg::Named { arg: sp::FunctionArgExpr::Expr(e), .. }
                    | sp::FunctionArg::ExprNamed { arg: sp::FunctionArgExpr::Expr(e), .. } => {
                        self.convert(e)
                    }
                    other => Err(QueryError::Unsupported(format!("function argument '{other}'"))),
                })
                .collect(),
        }
    }
}

fn convert_binary_op(op: &sp::BinaryOperator) -> QueryResult<BinaryOp> {
    match op {
        sp::BinaryOperator::Plus => Ok(BinaryOp::Add),
        sp::BinaryOperator::Minus => Ok(BinaryOp::Sub),
        sp::BinaryOperator::Multiply => Ok(BinaryOp::Mul),
        sp::BinaryOperator::Divide => Ok(BinaryOp::Div),
        sp::BinaryOperator::Modulo => Ok(BinaryOp::Mod),
        sp::BinaryOperator::Eq => Ok(BinaryOp::Eq),
        sp::BinaryOperator::NotEq => Ok(BinaryOp::NotEq),
        sp::BinaryOperator::Lt => Ok(BinaryOp::Lt),
        sp::BinaryOperator::LtEq => Ok(BinaryOp::LtEq),
        sp::BinaryOperator::Gt => Ok(BinaryOp::Gt),
        sp::BinaryOperator::GtEq => Ok(BinaryOp::GtEq),
        sp::BinaryOperator::And => Ok(BinaryOp::And),
        sp::BinaryOperator::Or => Ok(BinaryOp::Or),
        other => Err(QueryError::Unsupported(format!("operator {other}"))),
    }
}

fn convert_value(value: sp::Value) -> QueryResult<Value> {
    match value {
        sp::Value::Null => Ok(Value::Null),
        sp::Value::Boolean(b) => Ok(Value::Bool(b)),
        sp::Value::Number(n, _) => n
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| n.parse::<f64>().map(Value::Float))
            .map_err(|_| QueryError::illegal(&n, "invalid number literal")),
        sp::Value::SingleQuotedString(s) | sp::Value::DoubleQuotedString(s) => Ok(Value::String(s)),
        other => Err(QueryError::Unsupported(format!("literal {other}"))),
    }
}
