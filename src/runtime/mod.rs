//! # Runtime Module
//!
//! Process wiring for the operator: initialization, the controller watch
//! loop and its error policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use watch_loop::*;
