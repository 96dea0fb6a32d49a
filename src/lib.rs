//! Values assessment: a step-gated wizard for choosing, ranking and
//! reflecting on personal values, with migration from the legacy layout.

pub mod assessment;
pub mod auth;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod migration;
pub mod store;
