//! strata-lib: layered VM disk images built from line-oriented scripts.
//!
//! A script names a base image and a sequence of changes. Each change produces
//! a copy-on-write disk layer whose identity is derived from its parent and the
//! change, so rebuilding an unchanged prefix costs nothing.
//!
//! - `script`: directives and the parser
//! - `layer`: layer identities and the per-build arena
//! - `store`: on-disk cache of layers and tags, with per-identity locks
//! - `build`: folding a script into a layer chain
//! - `backend`: the external tools that create and mutate disks
//! - `vm`: running tagged disks as virtual machines

pub mod backend;
pub mod build;
pub mod consts;
pub mod layer;
pub mod platform;
pub mod script;
pub mod store;
pub mod util;
pub mod vm;
