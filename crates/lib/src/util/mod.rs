//! Shared utilities: identity hashing and test doubles.

pub mod hash;

#[cfg(test)]
pub mod testutil;
