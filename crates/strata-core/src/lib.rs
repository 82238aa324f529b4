//! Strata Core
//!
//! Shared types for the Strata object/relational mapper: the host values that
//! flow through queries, the host type descriptors used to type query
//! operators, and the domain metadata contract the query compiler consumes.
//!
//! # Overview
//!
//! - **Values**: [`Value`], the dynamically typed value exchanged between the
//!   relational engine, the in-memory pipeline and callers
//! - **Host types**: [`HostType`], the static type of an element, a sequence,
//!   a grouping or a record
//! - **Domain model**: the [`DomainModel`] trait with [`EntityType`],
//!   [`Attribute`], [`Navigation`] and [`StoreSymbol`], plus the in-memory
//!   [`ModelCatalog`] implementation
//!
//! # Example
//!
//! ```
//! use strata_core::{Attribute, DomainModel, EntityType, HostType, ModelCatalog, Navigation};
//!
//! let model = ModelCatalog::new("main")
//!     .with_entity(
//!         EntityType::new("User", "users")
//!             .with_key("id")
//!             .with_attribute(Attribute::primitive("id", "id", HostType::Int))
//!             .with_attribute(Attribute::primitive("name", "name", HostType::String))
//!             .with_navigation(Navigation::collection("orders", "Order", "id", "user_id")),
//!     )
//!     .with_entity(
//!         EntityType::new("Order", "orders")
//!             .with_key("id")
//!             .with_attribute(Attribute::primitive("id", "id", HostType::Int))
//!             .with_attribute(Attribute::primitive("user_id", "user_id", HostType::Int)),
//!     );
//!
//! assert!(model.validate().is_ok());
//! assert_eq!(model.entity("User").map(|e| e.table()), Some("users"));
//! ```
//!
//! # Modules
//!
//! - [`types`] - [`Value`] and [`HostType`]
//! - [`model`] - Domain metadata contract and catalog
//! - [`error`] - Error types ([`CoreError`])

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod model;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use model::{
    Attribute, DomainModel, EntityType, Member, ModelCatalog, Multiplicity, Navigation,
    StoreSymbol,
};
pub use types::{HostType, Value};
