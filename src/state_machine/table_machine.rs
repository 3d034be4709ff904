use super::{MachineCore, StateId, StateMachine, TransitionTable};

/// A machine whose whole behavior lives in its table: every tick it [fires](MachineCore::fire)
/// the table, running state hooks and taking the first transition whose condition holds.
#[derive(Debug)]
pub struct TableMachine<S> {
    core: MachineCore<S>,
}

impl<S: StateId> TableMachine<S> {
    pub fn new(table: TransitionTable<S>) -> Self {
        Self {
            core: MachineCore::new(table),
        }
    }
}

impl<S: StateId> StateMachine for TableMachine<S> {
    type State = S;

    fn core(&self) -> &MachineCore<S> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MachineCore<S> {
        &mut self.core
    }

    async fn step(&mut self) -> anyhow::Result<()> {
        if self.core.control().is_running() {
            self.core.fire();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::state_machine::{StateHooks, Transition};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Lamp {
        Warming,
        Lit,
        Off,
    }

    #[tokio::test]
    async fn test_runs_on_hooks_and_conditions() {
        let warmth = Arc::new(AtomicUsize::new(0));
        let lit = Arc::new(AtomicUsize::new(0));

        let heater = Arc::clone(&warmth);
        let seen = Arc::clone(&warmth);
        let counter = Arc::clone(&lit);
        let table = TransitionTable::declare(
            [
                Transition::new(Lamp::Warming, Lamp::Lit)
                    .when(move || seen.load(Ordering::SeqCst) >= 3),
                Transition::new(Lamp::Lit, Lamp::Off),
            ],
            Lamp::Warming,
            Lamp::Off,
        )
        .with_hooks(
            Lamp::Warming,
            StateHooks::builder()
                .during(Arc::new(move || {
                    heater.fetch_add(1, Ordering::SeqCst);
                }))
                .build(),
        )
        .unwrap()
        .with_hooks(
            Lamp::Lit,
            StateHooks::builder()
                .on_enter(Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .build(),
        )
        .unwrap();

        let machine = TableMachine::new(table)
            .start(Duration::from_millis(1))
            .join()
            .await
            .unwrap();

        assert_eq!(machine.state(), Lamp::Off);
        assert_eq!(warmth.load(Ordering::SeqCst), 3);
        assert_eq!(lit.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_before_start() {
        let mut machine = TableMachine::new(TransitionTable::declare(
            [(Lamp::Warming, Lamp::Off)],
            Lamp::Warming,
            Lamp::Off,
        ));
        machine.core_mut().advance(Lamp::Off).unwrap();

        assert!(machine.reset());
        assert_eq!(machine.state(), Lamp::Warming);
    }
}
