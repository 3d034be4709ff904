//! Machines run one after the other.
//!
//! A [`Sequence`] starts its first machine, waits for it to finish, then starts the next one,
//! and so on. It can be stopped as a whole, and reset once it is over to be run again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use super::{Control, Hook, StateMachine};

/// Where a sequence stands, shared between the sequence and its handle.
#[derive(Debug, Default)]
struct Progress {
    running: AtomicBool,
    stopped: AtomicBool,
    current: Mutex<Option<Arc<Control>>>,
}

impl Progress {
    fn track(&self, control: Option<Arc<Control>>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = control;
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(control) = &*self.current.lock().unwrap_or_else(PoisonError::into_inner) {
            control.stop();
        }
    }
}

pub struct Sequence<M> {
    machines: Vec<M>,
    progress: Arc<Progress>,
    on_reset: Option<Hook>,
}

impl<M: StateMachine> Sequence<M> {
    pub fn new(machines: impl IntoIterator<Item = M>) -> Self {
        Self {
            machines: machines.into_iter().collect(),
            progress: Arc::new(Progress::default()),
            on_reset: None,
        }
    }

    /// Run `hook` after every successful [`reset`](Self::reset).
    pub fn with_on_reset(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reset = Some(Arc::new(hook));
        self
    }

    pub fn machines(&self) -> &[M] {
        &self.machines
    }

    pub fn into_machines(self) -> Vec<M> {
        self.machines
    }

    pub fn is_running(&self) -> bool {
        self.progress.running.load(Ordering::SeqCst)
    }

    /// Reset every machine so the sequence can run again. Refused while it is running.
    pub fn reset(&mut self) -> bool {
        if self.is_running() {
            warn!("Cannot reset a running sequence");
            return false;
        }

        info!(machines = self.machines.len(), "Resetting sequence");
        for machine in &mut self.machines {
            machine.reset();
        }
        self.progress.stopped.store(false, Ordering::SeqCst);

        if let Some(hook) = &self.on_reset {
            hook();
        }
        true
    }

    /// Run every machine in turn in the current task, each ticking every `tick`.
    ///
    /// Machines left over after a stop request are kept as they are, without being started.
    pub async fn tick(&mut self, tick: Duration) {
        self.progress.running.store(true, Ordering::SeqCst);
        info!(machines = self.machines.len(), "Beginning of the sequence");

        let pending = std::mem::take(&mut self.machines);
        for (index, machine) in pending.into_iter().enumerate() {
            if self.progress.stopped.load(Ordering::SeqCst) {
                self.machines.push(machine);
                continue;
            }

            let handle = machine.start(tick);
            self.progress.track(Some(handle.control()));
            if self.progress.stopped.load(Ordering::SeqCst) {
                handle.stop();
            }

            match handle.join().await {
                Ok(machine) => self.machines.push(machine),
                Err(err) => error!(index, error = %err, "Machine of the sequence was lost"),
            }
            self.progress.track(None);
        }

        info!("End of the sequence");
        self.progress.running.store(false, Ordering::SeqCst);
    }

    /// Run the sequence in a worker of its own.
    pub fn start(mut self, tick: Duration) -> SequenceHandle<M> {
        self.progress.running.store(true, Ordering::SeqCst);
        let progress = Arc::clone(&self.progress);

        let task = tokio::spawn(async move {
            self.tick(tick).await;
            self
        });

        SequenceHandle { progress, task }
    }
}

/// The owner's side of a sequence running as an independent worker.
pub struct SequenceHandle<M> {
    progress: Arc<Progress>,
    task: JoinHandle<Sequence<M>>,
}

impl<M> SequenceHandle<M> {
    pub fn is_running(&self) -> bool {
        self.progress.running.load(Ordering::SeqCst)
    }

    /// Stop the machine currently running, and skip those after it.
    pub fn stop(&self) {
        self.progress.stop();
    }

    /// Wait for the last machine to finish, and take the sequence back.
    pub async fn join(self) -> Result<Sequence<M>, JoinError> {
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::state_machine::{StateHooks, TableMachine, Transition, TransitionTable};

    const TICK: Duration = Duration::from_millis(1);

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Step {
        Ready,
        Done,
    }

    /// A machine counting its ticks in `ticks`, done once `ticks` reaches `until`.
    fn counting(ticks: &Arc<AtomicUsize>, until: usize) -> TableMachine<Step> {
        let counter = Arc::clone(ticks);
        let seen = Arc::clone(ticks);
        let table = TransitionTable::declare(
            [Transition::new(Step::Ready, Step::Done)
                .when(move || seen.load(Ordering::SeqCst) >= until)],
            Step::Ready,
            Step::Done,
        )
        .with_hooks(
            Step::Ready,
            StateHooks::builder()
                .during(Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .build(),
        )
        .unwrap();
        TableMachine::new(table)
    }

    #[tokio::test]
    async fn test_runs_machines_in_turn() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        // the second machine records how far the first one went when it starts
        let witness = Arc::new(AtomicUsize::new(usize::MAX));
        let (from, to) = (Arc::clone(&first), Arc::clone(&witness));
        let starter = TableMachine::new(TransitionTable::declare(
            [Transition::new(Step::Ready, Step::Done).then(move || {
                to.store(from.load(Ordering::SeqCst), Ordering::SeqCst);
            })],
            Step::Ready,
            Step::Done,
        ));

        let sequence = Sequence::new([counting(&first, 3), starter, counting(&second, 2)]);
        assert!(!sequence.is_running());

        let handle = sequence.start(TICK);
        assert!(handle.is_running());
        let sequence = handle.join().await.unwrap();

        assert!(!sequence.is_running());
        assert_eq!(witness.load(Ordering::SeqCst), 3);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert!(sequence.machines().iter().all(|machine| machine.is_done()));
    }

    #[tokio::test]
    async fn test_reset() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let resets = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&resets);
        let mut sequence = Sequence::new([counting(&ticks, 1), counting(&ticks, 2)])
            .with_on_reset(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        sequence.tick(TICK).await;
        assert!(sequence.machines().iter().all(|machine| machine.is_done()));

        assert!(sequence.reset());
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert!(sequence.machines().iter().all(|machine| machine.state() == Step::Ready));

        sequence.tick(TICK).await;
        assert!(sequence.machines().iter().all(|machine| machine.is_done()));
    }

    #[tokio::test]
    async fn test_stop_skips_the_rest() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let handle = Sequence::new([counting(&ticks, usize::MAX), counting(&ticks, 1)]).start(TICK);

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.stop();
        let sequence = handle.join().await.unwrap();

        let machines = sequence.into_machines();
        assert_eq!(machines.len(), 2);
        assert!(machines[0].is_done());
        assert!(machines[0].core().control().is_stopped());
        assert_eq!(machines[1].state(), Step::Ready);
    }
}
