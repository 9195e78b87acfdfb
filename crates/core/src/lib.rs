//! Domain layer shared by storage and the HTTP application: entity types,
//! write validation, read projections and pagination.

pub mod pagination;
pub mod projection;
pub mod types;
pub mod validation;
