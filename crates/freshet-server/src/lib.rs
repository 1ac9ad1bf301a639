//! REST surface: scrape triggers, product freshness reads, job inspection,
//! health, and OpenAPI documentation.

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;
