//! Runtime wiring for the sotto session coordinator.

pub mod runtime;

pub use runtime::{start_session, SessionHandle};
