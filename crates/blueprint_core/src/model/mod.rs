//! Blueprint domain model.
//!
//! # Responsibility
//! - Define course, master template and association records shared by the
//!   catalog, store and manager layers.
//! - Keep validation rules next to the data they constrain.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - A course is a master, an associate, or neither; never both.

pub mod course;
pub mod template;
