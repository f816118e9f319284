//! Use-case services layered over the repositories.
//!
//! # Responsibility
//! - Combine repository calls into page- and list-level operations.
//! - Keep callers away from range arithmetic and reserved-list lookups.

pub mod list_service;
pub mod page_service;
