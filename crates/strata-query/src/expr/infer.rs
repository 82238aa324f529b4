//! Type inference for expression bodies.

use strata_core::{DomainModel, HostType, Member, Value};

use super::{BinaryOp, Builtin, Expr, UnaryOp};
use crate::error::{QueryError, QueryResult};

/// Parameter types plus the model used to resolve member accesses.
pub struct TypeScope<'a> {
    model: &'a dyn DomainModel,
    params: Vec<(String, HostType)>,
}

impl<'a> TypeScope<'a> {
    /// Creates an empty scope.
    #[must_use]
    pub fn new(model: &'a dyn DomainModel) -> Self {
        Self { model, params: Vec::new() }
    }

    /// Adds a parameter binding.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, ty: HostType) -> Self {
        self.params.push((name.into(), ty));
        self
    }

    /// Infers the type of an expression.
    pub fn infer(&self, expr: &Expr) -> QueryResult<HostType> {
        match expr {
            Expr::Parameter(name) => self
                .params
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, ty)| ty.clone())
                .ok_or_else(|| QueryError::illegal(expr, "unknown parameter")),
            Expr::Constant(value) => Ok(constant_type(value)),
            Expr::Member { target, member } => {
                let target_type = self.infer(target)?;
                self.member_type(&target_type, member)
                    .map_err(|err| match err {
                        QueryError::IllegalExpression { reason, .. } => {
                            QueryError::illegal(expr, reason)
                        }
                        other => other,
                    })
            }
            Expr::Binary { left, op, right } => {
                let (lt, rt) = (self.infer(left)?, self.infer(right)?);
                Ok(binary_type(*op, &lt, &rt))
            }
            Expr::Unary { op, operand } => {
                let ty = self.infer(operand)?;
                Ok(match op {
                    UnaryOp::Neg => ty,
                    UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => HostType::Bool,
                })
            }
            Expr::Call { function, args } => {
                let arg_types = args.iter().map(|a| self.infer(a)).collect::<QueryResult<Vec<_>>>()?;
                Ok(Builtin::parse(function)
                    .map_or(HostType::Any, |builtin| builtin.return_type(&arg_types)))
            }
            Expr::Conditional { test, then, otherwise } => {
                self.infer(test)?;
                let then_type = self.infer(then)?;
                let otherwise_type = self.infer(otherwise)?;
                Ok(if then_type == HostType::Any { otherwise_type } else { then_type })
            }
            Expr::Record(fields) => Ok(HostType::Record(
                fields
                    .iter()
                    .map(|(name, e)| Ok((name.clone(), self.infer(e)?)))
                    .collect::<QueryResult<Vec<_>>>()?,
            )),
            Expr::InList { expr, list, .. } => {
                self.infer(expr)?;
                for item in list {
                    self.infer(item)?;
                }
                Ok(HostType::Bool)
            }
        }
    }

    /// Resolves the type of `target.member`.
    ///
    /// Members of a grouping other than `key` project over the grouped
    /// elements, and members of a sequence project over its elements.
    pub fn member_type(&self, target: &HostType, member: &str) -> QueryResult<HostType> {
        match target.unwrap_optional() {
            HostType::Entity(name) => match self.model.member(name, member)? {
                Member::Attribute(attribute) => Ok(attribute.ty().clone()),
                Member::Navigation(navigation) => Ok(navigation.target_type()),
            },
            HostType::Record(_) => target
                .field(member)
                .cloned()
                .ok_or_else(|| QueryError::illegal(member, format!("no field '{member}' on {target}"))),
            HostType::Grouping { key, element } => {
                if member == "key" {
                    Ok(key.as_ref().clone())
                } else {
                    Ok(flatten_sequence(self.member_type(element, member)?))
                }
            }
            HostType::Sequence(element) => Ok(flatten_sequence(self.member_type(element, member)?)),
            HostType::Any => Ok(HostType::Any),
            other => Err(QueryError::illegal(member, format!("{other} has no members"))),
        }
    }
}

fn flatten_sequence(ty: HostType) -> HostType {
    match ty {
        HostType::Sequence(inner) => HostType::Sequence(inner),
        other => HostType::sequence(other),
    }
}

fn constant_type(value: &Value) -> HostType {
    match value {
        Value::Bool(_) => HostType::Bool,
        Value::Int(_) => HostType::Int,
        Value::Float(_) => HostType::Float,
        Value::String(_) => HostType::String,
        Value::Bytes(_) => HostType::Bytes,
        Value::Array(items) => {
            HostType::sequence(items.first().map_or(HostType::Any, constant_type))
        }
        Value::Null | Value::Object(_) => HostType::Any,
    }
}

fn binary_type(op: BinaryOp, left: &HostType, right: &HostType) -> HostType {
    if !op.is_arithmetic() {
        return HostType::Bool;
    }
    match (left.unwrap_optional(), right.unwrap_optional()) {
        (HostType::String, _) | (_, HostType::String) if op == BinaryOp::Add => HostType::String,
        (HostType::Float, _) | (_, HostType::Float) => HostType::Float,
        (HostType::Int, HostType::Int) => HostType::Int,
        _ => HostType::Any,
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{Attribute, EntityType, ModelCatalog, Navigation};

    use super::*;

    fn model() -> ModelCatalog {
        ModelCatalog::new("main")
            .with_entity(
                EntityType::new("Order", "orders")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("total", "total", HostType::Float))
                    .with_navigation(Navigation::reference("customer", "Customer", "customer_id", "id")),
            )
            .with_entity(
                EntityType::new("Customer", "customers")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("name", "name", HostType::String))
                    .with_navigation(Navigation::collection("orders", "Order", "id", "customer_id")),
            )
    }

    #[test]
    fn infers_member_chains() {
        let model = model();
        let scope = TypeScope::new(&model).with_param("o", HostType::entity("Order"));
        let ty = scope.infer(&Expr::path("o", &["customer", "name"])).expect("type");
        assert_eq!(ty, HostType::String);

        let ty = scope.infer(&Expr::path("o", &["customer", "orders"])).expect("type");
        assert_eq!(ty, HostType::sequence(HostType::entity("Order")));
    }

    #[test]
    fn unknown_member_is_illegal() {
        let model = model();
        let scope = TypeScope::new(&model).with_param("o", HostType::entity("Order"));
        let err = scope.infer(&Expr::path("o", &["nope"])).expect_err("unknown member");
        assert!(matches!(err, QueryError::Model(_)));
        let err = scope.infer(&Expr::param("z")).expect_err("unknown param");
        assert!(matches!(err, QueryError::IllegalExpression { .. }));
    }

    #[test]
    fn grouping_members_project_over_elements() {
        let model = model();
        let group = HostType::grouping(HostType::Int, HostType::entity("Order"));
        let scope = TypeScope::new(&model).with_param("g", group);
        assert_eq!(scope.infer(&Expr::path("g", &["key"])).expect("key"), HostType::Int);
        let totals = Expr::call("sum", vec![Expr::path("g", &["total"])]);
        assert_eq!(scope.infer(&totals).expect("sum"), HostType::Float);
        let count = Expr::call("count", vec![Expr::param("g")]);
        assert_eq!(scope.infer(&count).expect("count"), HostType::Int);
    }

    #[test]
    fn arithmetic_promotes_to_float() {
        let model = model();
        let scope = TypeScope::new(&model).with_param("o", HostType::entity("Order"));
        let expr = Expr::path("o", &["id"]).add(Expr::path("o", &["total"]));
        assert_eq!(scope.infer(&expr).expect("type"), HostType::Float);
        let expr = Expr::path("o", &["id"]).gt(Expr::int(3));
        assert_eq!(scope.infer(&expr).expect("type"), HostType::Bool);
    }

    #[test]
    fn records_infer_field_types() {
        let model = model();
        let scope = TypeScope::new(&model).with_param("c", HostType::entity("Customer"));
        let expr = Expr::record([("n", Expr::path("c", &["name"])), ("k", Expr::path("c", &["id"]))]);
        assert_eq!(
            scope.infer(&expr).expect("type"),
            HostType::record([("n", HostType::String), ("k", HostType::Int)])
        );
    }
}
