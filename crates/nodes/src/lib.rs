//! `nodes` crate — the `NodeBehavior` trait and a mock node set used by
//! tests and the CLI.
//!
//! Every node type, built-in or plugin, must implement [`NodeBehavior`].
//! The engine crate dispatches `process` through this trait object; it
//! never depends on what a concrete node actually does.

pub mod error;
pub mod traits;
pub mod mock;

pub use error::NodeError;
pub use traits::{ExecutionContext, NodeBehavior, PortInputs, StateView};
