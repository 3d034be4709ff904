//! Concrete machines built on the [`state_machine`](crate::state_machine) runtime.

pub mod input;

pub use self::input::{InputMachine, InputRequest, InputState};
