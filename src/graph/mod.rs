//! Hierarchy layer: items storage and the traversal strategies behind it.

pub mod cte;
pub mod dialect;
pub mod session_vars;
pub mod sql;
pub mod store;
pub mod traversal;
