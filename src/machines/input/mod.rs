//! A machine asking one question and waiting for a usable answer.
//!
//! The machine says its question, then listens to the inbound token channel. Each token goes
//! through the configured [`Filter`]; the first accepted one is recorded in the shared context
//! and in the store of the bot, and the machine ends. When nothing usable comes in before the
//! retry delay the question is prompted again once, and after the cancel delay it is abandoned
//! with the previous value at the answer key left in place.

pub mod error;
pub mod matching;
pub mod request;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bot::{Bot, Utterance};
use crate::channel::{Message, TokenReceiver, error::ChannelError};
use crate::context::Context;
use crate::state_machine::{MachineCore, StateMachine, TransitionTable};

pub use self::error::{InputConfigError, NotListening, PatternError};
pub use self::matching::{Filter, search_expression, search_mask};
pub use self::request::{
    Announcement, DEFAULT_CANCEL_DELAY, DEFAULT_RETRY_DELAY, InputCallback, InputRequest,
};

pub const ANSWER_MESSAGE: &str = "Ok, this has been noted";
pub const RETRY_MESSAGE: &str = "Invalid input, please retry";
pub const CANCEL_MESSAGE: &str = "Ok, forget about it";

/// Store label under which accepted answers are recorded.
pub const INPUT_LABEL: &str = "input";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputState {
    /// The question has not been asked yet.
    Begin,
    /// Listening for an answer.
    Waiting,
    /// Listening for an answer, after the question was prompted again.
    Delayed,
    End,
}

impl InputState {
    pub fn table() -> TransitionTable<Self> {
        TransitionTable::declare(
            [
                (Self::Begin, Self::Waiting),
                (Self::Waiting, Self::Delayed),
                (Self::Waiting, Self::End),
                (Self::Delayed, Self::End),
            ],
            Self::Begin,
            Self::End,
        )
    }

    fn is_listening(self) -> bool {
        matches!(self, Self::Waiting | Self::Delayed)
    }
}

pub struct InputMachine {
    core: MachineCore<InputState>,
    request: InputRequest,
    bot: Arc<dyn Bot>,
    context: Arc<Context>,
    fan: TokenReceiver,
    prefix: String,
    created: Instant,
}

impl InputMachine {
    /// Construct a machine asking `request` on behalf of `bot`, reading answers from `fan`.
    pub fn new(
        request: InputRequest,
        bot: Arc<dyn Bot>,
        context: Arc<Context>,
        fan: TokenReceiver,
    ) -> Self {
        Self {
            core: MachineCore::new(InputState::table()),
            request,
            bot,
            context,
            fan,
            prefix: format!("input.{}", Uuid::new_v4().simple()),
            created: Instant::now(),
        }
    }

    /// Use `prefix` for the context keys private to this machine.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn request(&self) -> &InputRequest {
        &self.request
    }

    /// Time since the machine was constructed.
    pub fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    /// Read a key private to this machine from the shared context.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.context.get(&format!("{}.{key}", self.prefix))
    }

    /// Write a key private to this machine into the shared context.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.context.set(&format!("{}.{key}", self.prefix), value);
    }

    /// The accepted answer, once there is one.
    pub fn answer(&self) -> Option<String> {
        self.get("answer")
            .and_then(|value| value.as_str().map(str::to_string))
    }

    /// Say the question and start listening.
    pub fn ask(&mut self) -> anyhow::Result<()> {
        self.bot.say(Utterance {
            text: self.request.question.clone().unwrap_or_default(),
            content: self.request.question_content.clone(),
            file: None,
        });

        self.core.advance(InputState::Waiting)?;
        Ok(())
    }

    /// Run one listening cycle: check deadlines, then wait briefly for one token.
    pub async fn receive(&mut self) -> anyhow::Result<()> {
        if !self.context.is_switched_on() || !self.core.control().is_running() {
            return Ok(());
        }

        if self.elapsed() >= self.request.cancel_delay {
            info!(prefix = %self.prefix, elapsed = ?self.elapsed(), "No answer in time");
            self.cancel();
            return Ok(());
        }

        match self.fan.get(self.read_wait()).await {
            Ok(Message::Payload(token)) => self.execute(&token)?,

            Ok(Message::Shutdown) | Err(ChannelError::Closed) => {
                info!(prefix = %self.prefix, "Input channel shut down");
                if self.request.is_mandatory {
                    self.say_cancel();
                }
                self.end();
            }

            Err(ChannelError::Empty) => {
                if self.core.state() == InputState::Waiting
                    && self.elapsed() >= self.request.retry_delay
                {
                    self.say_retry();
                    self.core.advance(InputState::Delayed)?;
                }
            }
        }

        Ok(())
    }

    /// Handle one candidate answer. Fails without any effect unless the machine is listening.
    pub fn execute(&mut self, arguments: &str) -> anyhow::Result<()> {
        let state = self.core.state();
        if !state.is_listening() {
            return Err(NotListening {
                state: format!("{state:?}"),
            }
            .into());
        }

        if arguments.is_empty() {
            self.say_retry();
            return Ok(());
        }

        let Some(value) = self.filter(arguments) else {
            debug!(prefix = %self.prefix, arguments = %arguments, "Input rejected by filter");
            self.say_retry();
            return Ok(());
        };

        if let Err(err) = self.on_input(&value) {
            warn!(prefix = %self.prefix, error = %err, "Input rejected by callback");
            self.say_retry();
            return Ok(());
        }

        self.set("answer", value.as_str());

        let key = match &self.request.key {
            Some(key) => {
                self.context.set(key, value.as_str());
                key.clone()
            }
            None => format!("{}.answer", self.prefix),
        };

        if let Err(err) = self.bot.update(INPUT_LABEL, &key, Value::from(value.as_str())) {
            warn!(key = %key, error = %err, "Failed to record answer");
        }

        info!(prefix = %self.prefix, key = %key, "Answer accepted");
        self.say_answer(&value);
        self.core.advance(InputState::End)?;
        Ok(())
    }

    /// Extract the accepted value from `value`, or `None` when it does not fit.
    pub fn filter(&self, value: &str) -> Option<String> {
        self.request.filter.apply(value)
    }

    /// Pass an accepted value to the user hook, containing whatever goes wrong in there.
    fn on_input(&self, value: &str) -> anyhow::Result<()> {
        let Some(callback) = &self.request.on_input else {
            return Ok(());
        };

        std::panic::catch_unwind(AssertUnwindSafe(|| callback(value)))
            .unwrap_or_else(|_| Err(anyhow!("input callback panicked")))
    }

    /// Give up on the question.
    pub fn cancel(&mut self) {
        self.say_cancel();
        self.end();
    }

    pub fn say_answer(&self, answer: &str) {
        self.bot
            .say(self.request.on_answer.utterance(ANSWER_MESSAGE, Some(answer)));
    }

    pub fn say_retry(&self) {
        self.bot
            .say(self.request.on_retry.utterance(RETRY_MESSAGE, None));
    }

    pub fn say_cancel(&self) {
        self.bot
            .say(self.request.on_cancel.utterance(CANCEL_MESSAGE, None));
    }

    fn read_wait(&self) -> Duration {
        self.core.tick_duration() / 2
    }

    fn end(&mut self) {
        self.core.stop();
        if let Err(err) = self.core.advance(InputState::End) {
            // the runner finishes the machine on the stop request instead
            debug!(prefix = %self.prefix, error = %err, "Ending before listening");
        }
    }
}

impl StateMachine for InputMachine {
    type State = InputState;

    fn core(&self) -> &MachineCore<InputState> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MachineCore<InputState> {
        &mut self.core
    }

    async fn step(&mut self) -> anyhow::Result<()> {
        if self.core.control().is_cancelled() && !self.core.is_done() {
            info!(prefix = %self.prefix, "Cancel requested");
            self.cancel();
            return Ok(());
        }

        match self.core.state() {
            InputState::Begin => self.ask(),
            InputState::Waiting | InputState::Delayed => self.receive().await,
            InputState::End => Ok(()),
        }
    }

    /// Restart the clock and forget the answer, so the question can be asked afresh.
    fn on_reset(&mut self) {
        self.created = Instant::now();
        self.set("answer", Value::Null);
    }
}
