use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bon::bon;

use super::error::InputConfigError;
use super::matching::Filter;
use crate::bot::Utterance;

/// Delay before the question is asked again.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(20);

/// Delay before the question is abandoned.
pub const DEFAULT_CANCEL_DELAY: Duration = Duration::from_secs(40);

/// A user hook receiving every accepted answer. Returning an error, or panicking, turns the
/// answer down.
pub type InputCallback = Arc<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;

/// What to say on one kind of event. Empty announcements fall back to a default message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Announcement {
    pub text: Option<String>,
    pub content: Option<String>,
    pub file: Option<String>,
}

impl Announcement {
    fn new(text: Option<String>, content: Option<String>, file: Option<String>) -> Self {
        Self {
            text: non_empty(text),
            content: non_empty(content),
            file: non_empty(file),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.content.is_none() && self.file.is_none()
    }

    /// Build the utterance for this announcement, filling `{}` in text and content with `answer`.
    pub fn utterance(&self, fallback: &str, answer: Option<&str>) -> Utterance {
        if self.is_empty() {
            return Utterance::text(fallback);
        }

        let fill = |template: &String| match answer {
            Some(answer) => template.replace("{}", answer),
            None => template.clone(),
        };

        Utterance {
            text: self.text.as_ref().map(fill).unwrap_or_default(),
            content: self.content.as_ref().map(fill),
            file: self.file.clone(),
        }
    }
}

/// Everything an [`InputMachine`](super::InputMachine) needs to know about the question it asks.
///
/// Built with [`InputRequest::builder`], which refuses configurations that could never work:
/// a request without any question, or one combining a mask with a regex.
#[derive(Clone)]
pub struct InputRequest {
    pub(super) question: Option<String>,
    pub(super) question_content: Option<String>,
    pub(super) mask: Option<String>,
    pub(super) regex: Option<String>,
    pub(super) filter: Filter,
    pub(super) on_answer: Announcement,
    pub(super) on_retry: Announcement,
    pub(super) on_cancel: Announcement,
    pub(super) on_input: Option<InputCallback>,
    pub(super) is_mandatory: bool,
    pub(super) retry_delay: Duration,
    pub(super) cancel_delay: Duration,
    pub(super) key: Option<String>,
}

#[bon]
impl InputRequest {
    #[builder]
    pub fn new(
        #[builder(into)] question: Option<String>,
        #[builder(into)] question_content: Option<String>,
        #[builder(into)] mask: Option<String>,
        #[builder(into)] regex: Option<String>,
        #[builder(into)] on_answer: Option<String>,
        #[builder(into)] on_answer_content: Option<String>,
        #[builder(into)] on_answer_file: Option<String>,
        #[builder(into)] on_retry: Option<String>,
        #[builder(into)] on_retry_content: Option<String>,
        #[builder(into)] on_retry_file: Option<String>,
        #[builder(into)] on_cancel: Option<String>,
        #[builder(into)] on_cancel_content: Option<String>,
        #[builder(into)] on_cancel_file: Option<String>,
        on_input: Option<InputCallback>,
        #[builder(default)] is_mandatory: bool,
        #[builder(default = DEFAULT_RETRY_DELAY)] retry_delay: Duration,
        #[builder(default = DEFAULT_CANCEL_DELAY)] cancel_delay: Duration,
        #[builder(into)] key: Option<String>,
    ) -> Result<Self, InputConfigError> {
        let question = non_empty(question);
        let question_content = non_empty(question_content);
        if question.is_none() && question_content.is_none() {
            return Err(InputConfigError::MissingQuestion);
        }

        let mask = non_empty(mask);
        let regex = non_empty(regex);
        if mask.is_some() && regex.is_some() {
            return Err(InputConfigError::ConflictingFilters);
        }

        let filter = Filter::new(mask.as_deref(), regex.as_deref())?;

        Ok(Self {
            question,
            question_content,
            mask,
            regex,
            filter,
            on_answer: Announcement::new(on_answer, on_answer_content, on_answer_file),
            on_retry: Announcement::new(on_retry, on_retry_content, on_retry_file),
            on_cancel: Announcement::new(on_cancel, on_cancel_content, on_cancel_file),
            on_input,
            is_mandatory,
            retry_delay,
            cancel_delay,
            key: non_empty(key),
        })
    }

    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    pub fn question_content(&self) -> Option<&str> {
        self.question_content.as_deref()
    }

    pub fn mask(&self) -> Option<&str> {
        self.mask.as_deref()
    }

    pub fn regex(&self) -> Option<&str> {
        self.regex.as_deref()
    }

    pub fn on_answer(&self) -> &Announcement {
        &self.on_answer
    }

    pub fn on_retry(&self) -> &Announcement {
        &self.on_retry
    }

    pub fn on_cancel(&self) -> &Announcement {
        &self.on_cancel
    }

    pub fn is_mandatory(&self) -> bool {
        self.is_mandatory
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn cancel_delay(&self) -> Duration {
        self.cancel_delay
    }

    /// Context key receiving the answer, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

impl fmt::Debug for InputRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRequest")
            .field("question", &self.question)
            .field("question_content", &self.question_content)
            .field("mask", &self.mask)
            .field("regex", &self.regex)
            .field("on_answer", &self.on_answer)
            .field("on_retry", &self.on_retry)
            .field("on_cancel", &self.on_cancel)
            .field("on_input", &self.on_input.as_ref().map(|_| "<callback>"))
            .field("is_mandatory", &self.is_mandatory)
            .field("retry_delay", &self.retry_delay)
            .field("cancel_delay", &self.cancel_delay)
            .field("key", &self.key)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
