//! Host values and host type descriptors.

mod host;
mod value;

#[cfg(test)]
mod proptest_tests;

pub use host::HostType;
pub use value::Value;
