use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use tracing::{debug, warn};

use super::StateId;
use super::error::{TableError, TransitionNotAllowed};
use super::runner::Control;

/// Tick interval used when a machine is not given one explicitly.
pub const DEFAULT_TICK: Duration = Duration::from_millis(200);

/// A side effect run while a machine sits in a state or moves between states.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Decides whether a transition may fire on the current step.
pub type Condition = Arc<dyn Fn() -> bool + Send + Sync>;

/// One allowed move between two states.
///
/// When fired by [`MachineCore::fire`] the transition is only taken if its condition holds, or
/// if it has none. Its action runs before the source state is exited.
#[derive(Clone)]
pub struct Transition<S> {
    source: S,
    target: S,
    condition: Option<Condition>,
    action: Option<Hook>,
}

impl<S: StateId> Transition<S> {
    pub fn new(source: S, target: S) -> Self {
        Self {
            source,
            target,
            condition: None,
            action: None,
        }
    }

    /// Only fire this transition when `condition` returns `true`.
    pub fn when(mut self, condition: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Run `action` whenever this transition is taken.
    pub fn then(mut self, action: impl Fn() + Send + Sync + 'static) -> Self {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn source(&self) -> S {
        self.source
    }

    pub fn target(&self) -> S {
        self.target
    }

    fn is_open(&self) -> bool {
        self.condition.as_ref().is_none_or(|condition| condition())
    }
}

impl<S: StateId> From<(S, S)> for Transition<S> {
    fn from((source, target): (S, S)) -> Self {
        Self::new(source, target)
    }
}

impl<S: fmt::Debug> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("condition", &self.condition.is_some())
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Side effects bound to one state.
#[derive(Clone, Default, Builder)]
pub struct StateHooks {
    /// Run on every [`fire`](MachineCore::fire) while in the state, before transitions are tried.
    pub during: Option<Hook>,
    pub on_enter: Option<Hook>,
    pub on_exit: Option<Hook>,
}

impl fmt::Debug for StateHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHooks")
            .field("during", &self.during.is_some())
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

fn run(hook: Option<&Hook>) {
    if let Some(hook) = hook {
        hook();
    }
}

/// The states of a machine and the transitions allowed between them.
#[derive(Debug, Clone)]
pub struct TransitionTable<S> {
    states: HashSet<S>,
    transitions: HashMap<S, Vec<Transition<S>>>,
    hooks: HashMap<S, StateHooks>,
    initial: S,
    terminal: S,
}

impl<S: StateId> TransitionTable<S> {
    /// Build a table from declared `states` and transitions, given as [`Transition`]s or
    /// `(source, target)` pairs.
    ///
    /// Every state referred to by `initial`, `terminal` or a transition must be declared.
    pub fn new<T>(
        states: impl IntoIterator<Item = S>,
        transitions: impl IntoIterator<Item = T>,
        initial: S,
        terminal: S,
    ) -> Result<Self, TableError>
    where
        T: Into<Transition<S>>,
    {
        let states: HashSet<S> = states.into_iter().collect();

        if !states.contains(&initial) {
            return Err(TableError::InvalidInitial {
                state: format!("{initial:?}"),
            });
        }

        if !states.contains(&terminal) {
            return Err(TableError::InvalidTerminal {
                state: format!("{terminal:?}"),
            });
        }

        let mut table: HashMap<S, Vec<Transition<S>>> = HashMap::new();
        for transition in transitions {
            let transition = transition.into();

            if !states.contains(&transition.source) {
                return Err(TableError::InvalidSource {
                    state: format!("{:?}", transition.source),
                });
            }

            if !states.contains(&transition.target) {
                return Err(TableError::InvalidTarget {
                    state: format!("{:?}", transition.target),
                });
            }

            table.entry(transition.source).or_default().push(transition);
        }

        Ok(Self {
            states,
            transitions: table,
            hooks: HashMap::new(),
            initial,
            terminal,
        })
    }

    /// Build a table whose states are exactly those named by `initial`, `terminal` and the
    /// transitions. Nothing can be undeclared, so this never fails.
    pub fn declare<T>(transitions: impl IntoIterator<Item = T>, initial: S, terminal: S) -> Self
    where
        T: Into<Transition<S>>,
    {
        let mut states = HashSet::from([initial, terminal]);
        let mut table: HashMap<S, Vec<Transition<S>>> = HashMap::new();

        for transition in transitions {
            let transition = transition.into();
            states.insert(transition.source);
            states.insert(transition.target);
            table.entry(transition.source).or_default().push(transition);
        }

        Self {
            states,
            transitions: table,
            hooks: HashMap::new(),
            initial,
            terminal,
        }
    }

    /// Bind `hooks` to `state`, replacing any bound before.
    pub fn with_hooks(mut self, state: S, hooks: StateHooks) -> Result<Self, TableError> {
        if !self.states.contains(&state) {
            return Err(TableError::InvalidHookState {
                state: format!("{state:?}"),
            });
        }

        self.hooks.insert(state, hooks);
        Ok(self)
    }

    pub fn states(&self) -> impl Iterator<Item = &S> {
        self.states.iter()
    }

    /// States that have at least one outgoing transition.
    pub fn sources(&self) -> impl Iterator<Item = &S> {
        self.transitions.keys()
    }

    /// Transitions out of `source`, in declaration order.
    pub fn transitions(&self, source: S) -> &[Transition<S>] {
        self.transitions
            .get(&source)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// States reachable in one step from `source`, in declaration order.
    pub fn targets(&self, source: S) -> impl Iterator<Item = S> + '_ {
        self.transitions(source).iter().map(Transition::target)
    }

    pub fn transition(&self, source: S, target: S) -> Option<&Transition<S>> {
        self.transitions(source)
            .iter()
            .find(|transition| transition.target == target)
    }

    pub fn allows(&self, source: S, target: S) -> bool {
        self.transition(source, target).is_some()
    }

    pub fn hooks(&self, state: S) -> Option<&StateHooks> {
        self.hooks.get(&state)
    }

    pub fn initial(&self) -> S {
        self.initial
    }

    pub fn terminal(&self) -> S {
        self.terminal
    }
}

/// The moving parts shared by every machine: its table, where it stands, how often it ticks,
/// and the flags its owner may flip while it runs.
#[derive(Debug)]
pub struct MachineCore<S> {
    table: Arc<TransitionTable<S>>,
    current: S,
    tick_duration: Duration,
    control: Arc<Control>,
}

impl<S: StateId> MachineCore<S> {
    /// Construct a core positioned on the initial state of `table`.
    pub fn new(table: TransitionTable<S>) -> Self {
        Self::shared(Arc::new(table))
    }

    /// Construct a core over a table shared with other machines.
    pub fn shared(table: Arc<TransitionTable<S>>) -> Self {
        Self {
            current: table.initial(),
            table,
            tick_duration: DEFAULT_TICK,
            control: Arc::new(Control::default()),
        }
    }

    pub fn state(&self) -> S {
        self.current
    }

    pub fn table(&self) -> &TransitionTable<S> {
        &self.table
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    pub fn set_tick_duration(&mut self, tick_duration: Duration) {
        self.tick_duration = tick_duration;
    }

    pub fn control(&self) -> &Arc<Control> {
        &self.control
    }

    pub fn is_done(&self) -> bool {
        self.current == self.table.terminal()
    }

    /// Move to `target`, provided the table allows it from the current state.
    ///
    /// The condition of the transition is not consulted, its action and the state hooks run.
    pub fn advance(&mut self, target: S) -> Result<(), TransitionNotAllowed> {
        let table = Arc::clone(&self.table);
        let Some(transition) = table.transition(self.current, target) else {
            return Err(TransitionNotAllowed {
                from: format!("{:?}", self.current),
                to: format!("{target:?}"),
            });
        };

        self.take(transition);
        Ok(())
    }

    /// Run the `during` hook of the current state, then take the first transition out of it
    /// whose condition holds. Returns the state reached, if the machine moved.
    pub fn fire(&mut self) -> Option<S> {
        let table = Arc::clone(&self.table);
        run(table.hooks(self.current).and_then(|hooks| hooks.during.as_ref()));

        let transition = table
            .transitions(self.current)
            .iter()
            .find(|transition| transition.is_open())?;

        self.take(transition);
        Some(self.current)
    }

    fn take(&mut self, transition: &Transition<S>) {
        debug!(from = ?transition.source, to = ?transition.target, "Transitioning");

        run(transition.action.as_ref());
        run(self.table.hooks(self.current).and_then(|hooks| hooks.on_exit.as_ref()));
        self.current = transition.target;
        run(self.table.hooks(self.current).and_then(|hooks| hooks.on_enter.as_ref()));
    }

    /// Request the machine to stop at the next tick boundary.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Jump to the terminal state. Only a stop request takes a machine there outside its table,
    /// and no hook runs on the way.
    pub(super) fn finish(&mut self) {
        if !self.is_done() {
            debug!(from = ?self.current, "Finishing on stop request");
            self.current = self.table.terminal();
        }
    }

    /// Move back to the initial state with fresh control flags, so the machine can be started
    /// again. Refused while the machine is running.
    pub fn reset(&mut self) -> bool {
        if self.control.is_running() {
            warn!(state = ?self.current, "Cannot reset a running machine");
            return false;
        }

        debug!(from = ?self.current, "Resetting");
        self.current = self.table.initial();
        self.control = Arc::new(Control::default());
        true
    }
}
