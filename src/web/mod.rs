//! HTTP surface: the snapshot reader API plus health and admin endpoints.

pub mod admin;
pub mod glossary;
pub mod middleware;
pub mod routes;
pub mod snapshot;
pub mod status;

pub use routes::*;
