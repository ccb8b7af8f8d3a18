//! Multi-tenant ESG analytics: dataset resolution, coercion, filtering and
//! the derived views, served over a small JSON API.

pub mod analytics;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod filter;
pub mod logging;
pub mod predictions;
pub mod store;
pub mod web;
