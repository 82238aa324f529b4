//! Shared fixture: a small domain model with one entity in a second store,
//! plus matching in-memory tables.

#![allow(dead_code)]

use std::sync::Arc;

use strata_core::{Attribute, EntityType, HostType, ModelCatalog, Navigation, Value};
use strata_query::exec::{row, MemoryDataSource, Row};
use strata_query::parser::CapturedQuery;
use strata_query::{CompilerConfig, Executor, Query};

pub fn model() -> ModelCatalog {
    ModelCatalog::new("main")
        .with_entity(
            EntityType::new("User", "users")
                .with_key("id")
                .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                .with_attribute(Attribute::primitive("name", "name", HostType::String))
                .with_attribute(Attribute::primitive("age", "age", HostType::Int))
                .with_navigation(Navigation::reference("team", "Team", "team_id", "id").optional())
                .with_navigation(Navigation::collection("orders", "Order", "id", "user_id"))
                .with_navigation(Navigation::collection("audits", "Audit", "id", "user_id")),
        )
        .with_entity(
            EntityType::new("Team", "teams")
                .with_key("id")
                .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                .with_attribute(Attribute::primitive("name", "name", HostType::String)),
        )
        .with_entity(
            EntityType::new("Order", "orders")
                .with_key("id")
                .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                .with_attribute(Attribute::primitive("user_id", "user_id", HostType::Int))
                .with_attribute(Attribute::primitive("total", "total", HostType::Int)),
        )
        .with_entity(
            EntityType::new("Audit", "audits")
                .with_key("id")
                .with_store("archive")
                .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                .with_attribute(Attribute::primitive("user_id", "user_id", HostType::Int))
                .with_attribute(Attribute::primitive("action", "action", HostType::String)),
        )
}

fn user(id: i64, name: &str, age: i64, team: Option<i64>) -> Row {
    row([
        ("id", Value::Int(id)),
        ("name", Value::from(name)),
        ("age", Value::Int(age)),
        ("team_id", team.map_or(Value::Null, Value::Int)),
    ])
}

fn order(id: i64, user: i64, total: i64) -> Row {
    row([("id", Value::Int(id)), ("user_id", Value::Int(user)), ("total", Value::Int(total))])
}

/// Four users, two teams, four orders.
pub fn main_store() -> MemoryDataSource {
    MemoryDataSource::new()
        .with_table(
            "users",
            [user(1, "ada", 36, Some(1)), user(2, "bob", 25, Some(1)), user(3, "cy", 41, Some(2)), user(4, "dee", 19, None)],
        )
        .with_table(
            "teams",
            [row([("id", Value::Int(1)), ("name", Value::from("core"))]), row([("id", Value::Int(2)), ("name", Value::from("ops"))])],
        )
        .with_table("orders", [order(10, 1, 5), order(11, 1, 7), order(12, 2, 3), order(13, 3, 11)])
}

pub fn archive_store() -> MemoryDataSource {
    MemoryDataSource::new().with_table(
        "audits",
        [
            row([("id", Value::Int(100)), ("user_id", Value::Int(1)), ("action", Value::from("login"))]),
            row([("id", Value::Int(101)), ("user_id", Value::Int(1)), ("action", Value::from("logout"))]),
            row([("id", Value::Int(102)), ("user_id", Value::Int(3)), ("action", Value::from("login"))]),
        ],
    )
}

/// Routes `tracing` output to the test harness; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn executor(model: &ModelCatalog, config: CompilerConfig) -> Executor<'_> {
    init_tracing();
    Executor::new(model, config)
        .with_source("main", Arc::new(main_store()))
        .with_source("archive", Arc::new(archive_store()))
}

/// Parses a chain of `(call, argument text)` against `root`. An empty text
/// means the call takes no argument.
pub fn parse(model: &ModelCatalog, root: &str, calls: &[(&str, &str)]) -> Query {
    calls
        .iter()
        .fold(CapturedQuery::new(root), |captured, &(name, arg)| {
            let args = if arg.is_empty() { Vec::new() } else { vec![arg.into()] };
            captured.call(name, args)
        })
        .parse(model)
        .unwrap()
}

/// `User.order_by(u => u.id).skip(skip).take(take)`.
pub fn paged(model: &ModelCatalog, skip: i64, take: i64) -> Query {
    CapturedQuery::new("User")
        .call("order_by", vec!["u => u.id".into()])
        .call("skip", vec![skip.into()])
        .call("take", vec![take.into()])
        .parse(model)
        .unwrap()
}

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

pub fn strings(values: &[&str]) -> Vec<Value> {
    values.iter().copied().map(Value::from).collect()
}
