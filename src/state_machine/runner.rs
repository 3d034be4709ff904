use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::StateMachine;

/// Flags an owner may flip while a machine runs in its own worker.
///
/// A machine is created paused, and [`start`] resumes it.
#[derive(Debug, Default)]
pub struct Control {
    stopped: AtomicBool,
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl Control {
    /// Request the machine to stop. Calling it more than once has no further effect.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Ask the machine to give up on its own terms at its next step, announcing whatever it
    /// announces when abandoned. The runner stops it right after that step either way.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// The owner's side of a machine running as an independent worker.
#[derive(Debug)]
pub struct MachineHandle<M> {
    control: Arc<Control>,
    task: JoinHandle<M>,
}

impl<M> MachineHandle<M> {
    /// Request the machine to stop at its next tick boundary.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Request the machine to cancel itself at its next step, see [`Control::cancel`].
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// A shared view on the flags of the machine, usable after the handle is joined.
    pub fn control(&self) -> Arc<Control> {
        Arc::clone(&self.control)
    }

    /// Wait for the machine to reach its terminal state, and take it back.
    pub async fn join(self) -> Result<M, JoinError> {
        self.task.await
    }
}

/// Spawn `machine` on the runtime, stepping it every `tick` until it is done or stopped.
pub fn start<M: StateMachine>(mut machine: M, tick: Duration) -> MachineHandle<M> {
    machine.core_mut().set_tick_duration(tick);

    let control = Arc::clone(machine.core().control());
    control.resume();

    let task = tokio::spawn(run(machine));

    MachineHandle { control, task }
}

async fn run<M: StateMachine>(mut machine: M) -> M {
    let tick = machine.core().tick_duration();
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(state = ?machine.state(), tick = ?tick, "Machine started");

    loop {
        ticker.tick().await;

        if machine.core().control().is_stopped() {
            break;
        }

        let state = machine.state();
        let cancelled = machine.core().control().is_cancelled();
        match AssertUnwindSafe(machine.step()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(state = ?state, error = %err, "Tick failed"),
            Err(_) => error!(state = ?state, "Tick panicked"),
        }

        if cancelled || machine.is_done() || machine.core().control().is_stopped() {
            break;
        }
    }

    machine.core_mut().finish();
    machine.core().control().pause();
    info!(state = ?machine.state(), "Machine stopped");

    machine
}
