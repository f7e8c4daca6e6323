//! Astra Core
//!
//! Resource model, provider trait, convergence loop and plan/apply engine
//! shared by the Astra provider and its CLI.

pub mod convergence;
pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
