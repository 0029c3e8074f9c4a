//! Master bundle orchestration for jetmaster.
//!
//! This crate ties the remote release store, component fetching and the
//! local workspace together into the two end-to-end workflows:
//! [`builder::build_master`] and [`promoter::promote`].

pub mod assembler;
pub mod builder;
pub mod progress;
pub mod promoter;
