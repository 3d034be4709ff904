pub mod error;
pub mod runner;
pub mod sequence;
pub mod table;
pub mod table_machine;

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

pub use self::runner::{Control, MachineHandle};
pub use self::sequence::{Sequence, SequenceHandle};
pub use self::table::{
    Condition, DEFAULT_TICK, Hook, MachineCore, StateHooks, Transition, TransitionTable,
};
pub use self::table_machine::TableMachine;

/// Identifies one state of a machine. Any small copyable type qualifies, most often a fieldless
/// enum.
pub trait StateId: Copy + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> StateId for T where T: Copy + Eq + Hash + Debug + Send + Sync + 'static {}

/// The [`StateMachine`] trait binds per-state logic to a [`TransitionTable`] and lets the
/// [`runner`] drive it tick after tick in a worker of its own.
///
/// # Functionality
/// A machine owns a [`MachineCore`] that records its table, its current state, its tick
/// interval and the [`Control`] flags its owner may flip while it runs. The implementor only
/// provides [`step`](StateMachine::step): the logic bound to the current state, executed once
/// per tick.
///
/// Inside `step` a machine moves with [`MachineCore::advance`], which refuses any transition
/// absent from the table, or lets the table decide with [`MachineCore::fire`], which runs the
/// `during` hook of the current state and takes the first transition whose condition holds.
/// Either way the transition action and the `on_exit`/`on_enter` hooks of the states involved
/// run. The current state therefore only ever moves along the table, with the single exception
/// of a stop request, which takes the machine straight to the terminal state at the next tick
/// boundary without running any more logic.
///
/// A cancel request is softer: the machine gets one more `step` to wind down on its own terms,
/// typically announcing that it gives up, and is stopped right after it.
///
/// # Failure
/// A `step` returning an error, or even panicking, is logged by the runner and counts as a tick
/// where nothing happened. The machine stays where it was and the next tick proceeds normally.
/// Implementors should still contain failures of code they do not own, such as user callbacks,
/// and turn them into regular outcomes of their own logic.
///
/// # Concurrency
/// Once [started](StateMachine::start) the machine is moved into its worker and its fields are
/// out of reach of the owner. The owner observes it through shared collaborators (context,
/// stores, channels) and steers it through the returned [`MachineHandle`], whose operations only
/// flip atomic flags and are safe to call at any time, from anywhere, any number of times.
///
/// Cancellation is cooperative: flags are sampled at tick boundaries, so a machine waiting on
/// input reacts within one tick plus whatever bounded wait its `step` performs.
///
/// # Example
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Light {
///     Red,
///     Green,
///     Off,
/// }
///
/// struct TrafficLight {
///     core: MachineCore<Light>,
///     cycles: usize,
/// }
///
/// impl StateMachine for TrafficLight {
///     type State = Light;
///
///     fn core(&self) -> &MachineCore<Light> {
///         &self.core
///     }
///
///     fn core_mut(&mut self) -> &mut MachineCore<Light> {
///         &mut self.core
///     }
///
///     async fn step(&mut self) -> anyhow::Result<()> {
///         match self.core.state() {
///             Light::Red => self.core.advance(Light::Green)?,
///             Light::Green if self.cycles == 0 => self.core.advance(Light::Off)?,
///             Light::Green => {
///                 self.cycles -= 1;
///                 self.core.advance(Light::Red)?
///             }
///             Light::Off => {}
///         }
///         Ok(())
///     }
/// }
///
/// let handle = light.start(Duration::from_millis(100));
/// let light = handle.join().await?;
/// ```
pub trait StateMachine: Send + Sized + 'static {
    /// The type identifying the states of this machine.
    type State: StateId;

    fn core(&self) -> &MachineCore<Self::State>;

    fn core_mut(&mut self) -> &mut MachineCore<Self::State>;

    /// Execute the logic bound to the current state once.
    ///
    /// Transitions taken here must go through [`MachineCore::advance`].
    fn step(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn state(&self) -> Self::State {
        self.core().state()
    }

    /// Whether the machine reached its terminal state.
    fn is_done(&self) -> bool {
        self.core().is_done()
    }

    /// Request the machine to stop at its next tick boundary. Idempotent.
    fn stop(&self) {
        self.core().stop();
    }

    /// Run the machine as an independent worker, stepping it every `tick`.
    fn start(self, tick: Duration) -> MachineHandle<Self> {
        runner::start(self, tick)
    }

    /// Bring a machine that is not running back to its initial state, ready to be started
    /// again. Returns `false` when it is running.
    fn reset(&mut self) -> bool {
        if !self.core_mut().reset() {
            return false;
        }

        self.on_reset();
        true
    }

    /// Clear whatever the machine keeps beyond its core when it is reset.
    fn on_reset(&mut self) {}
}
