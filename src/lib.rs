pub mod bot;
pub mod channel;
pub mod context;
pub mod machines;
pub mod state_machine;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use crate::bot::Bot;
use crate::channel::TokenReceiver;
use crate::context::Context;
use crate::machines::{InputMachine, InputRequest};
use crate::state_machine::{MachineHandle, StateMachine};

/// Ask `request` on behalf of `bot` in a worker of its own, ticking every `tick`.
///
/// The answer lands in `context` and in the store of the bot once accepted. The returned handle
/// can be joined to wait for the outcome, or used to cancel the question early, which announces
/// the cancellation like an expired deadline does.
pub fn ask(
    request: InputRequest,
    bot: Arc<dyn Bot>,
    context: Arc<Context>,
    fan: TokenReceiver,
    tick: Duration,
) -> MachineHandle<InputMachine> {
    InputMachine::new(request, bot, context, fan).start(tick)
}
