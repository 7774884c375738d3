//! CLI integration tests against fake host tools.

#![cfg(unix)]

mod common;

mod build_tests;
mod store_tests;
mod vm_tests;
