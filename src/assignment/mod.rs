//! Item-to-subject assignments.

pub mod store;

pub use store::{AssignmentsStorage, AssignmentsStore};
