//! Domain model for parametric sweeps.
//!
//! This crate owns everything that can be decided without running a command:
//! the parameter space, derived expressions, case enumeration, capture rules,
//! template rendering, the study file format and the result manifest. Process
//! execution and persistence live in `sweep_runner`.

pub mod capture;
pub mod cases;
pub mod config;
pub mod error;
pub mod expressions;
pub mod manifest;
pub mod parameters;
pub mod storage_keys;
pub mod study;
pub mod template;
pub mod value;

pub use error::{Result, StudyError};
