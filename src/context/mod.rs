use bon::Builder;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use self::error::{CheckError, InvalidSetting, MissingSetting};

pub mod error;

/// Key of the global run switch, read by machines on every tick.
pub const SWITCH_KEY: &str = "general.switch";

/// A validation function applied to a setting value by [`Context::check`].
pub type Validator = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// A key/value store shared by every worker of the bot.
///
/// Keys are dotted strings (`section.label`) and values are arbitrary JSON values. An explicitly
/// stored [`Value::Null`] is indistinguishable from an absent key when reading.
///
/// All operations lock at most one shard of the underlying map, and read-modify-write
/// operations such as [`increment`](Self::increment) hold the shard lock for their whole
/// duration, so they stay atomic when many workers race on the same key.
#[derive(Debug, Default)]
pub struct Context {
    values: DashMap<String, Value, ahash::RandomState>,
}

/// Options for [`Context::check`].
#[derive(Default, Builder)]
pub struct CheckRule {
    /// Value stored when the setting is absent.
    pub default: Option<Value>,

    /// Fail when the setting is absent and no default is given.
    #[builder(default)]
    pub is_mandatory: bool,

    /// Reject values for which this function returns `false`. Implies the setting is mandatory.
    pub validate: Option<Validator>,

    /// Resolve string values of the form `$NAME` from the process environment.
    #[builder(default)]
    pub filter: bool,
}

impl Context {
    /// Construct a new empty [`Context`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a [`Context`] pre-loaded with `settings`, see [`apply`](Self::apply).
    pub fn with_settings(settings: Value) -> Self {
        let context = Self::new();
        context.apply(settings);
        context
    }

    /// Merge a nested mapping into the flat key space.
    ///
    /// Nested objects are flattened one level into `section.label` keys, while top-level scalars
    /// land under the `general` section.
    pub fn apply(&self, settings: Value) {
        let Value::Object(sections) = settings else {
            warn!(settings = %settings, "Ignoring settings that are not a mapping");
            return;
        };

        for (section, value) in sections {
            match value {
                Value::Object(labels) => {
                    for (label, value) in labels {
                        self.set(&format!("{section}.{label}"), value);
                    }
                }
                value => self.set(&format!("general.{section}"), value),
            }
        }
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check whether `prefix` is a key, or the leading section of at least one key.
    pub fn has(&self, prefix: &str) -> bool {
        if prefix.is_empty() || prefix.starts_with('.') {
            return false;
        }

        let section = format!("{prefix}.");
        self.values
            .iter()
            .any(|entry| entry.key() == prefix || entry.key().starts_with(&section))
    }

    /// Retrieve the value of `key`, or `None` when it is absent or null.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .get(key)
            .map(|entry| entry.value().clone())
            .filter(|value| !value.is_null())
    }

    /// Retrieve the value of `key`, or `default` when it is absent or null.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Retrieve the value of `key` when it is a string.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|value| value.as_str().map(str::to_string))
    }

    /// Overwrite the value of `key`.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Atomically add `delta` to the gauge at `key` and return the new value.
    ///
    /// A missing or non-integer value counts as zero. The gauge saturates at the bounds of `i64`.
    pub fn increment(&self, key: &str, delta: i64) -> i64 {
        self.adjust(key, |value| value.saturating_add(delta))
    }

    /// Atomically subtract `delta` from the gauge at `key` and return the new value.
    pub fn decrement(&self, key: &str, delta: i64) -> i64 {
        self.adjust(key, |value| value.saturating_sub(delta))
    }

    fn adjust(&self, key: &str, update: impl FnOnce(i64) -> i64) -> i64 {
        let mut entry = self.values.entry(key.to_string()).or_insert(Value::Null);
        let value = update(entry.value().as_i64().unwrap_or(0));
        *entry.value_mut() = Value::from(value);
        value
    }

    /// Whether the global run switch is on. The switch is on unless set to `"off"`.
    pub fn is_switched_on(&self) -> bool {
        self.get_str(SWITCH_KEY).as_deref() != Some("off")
    }

    /// Check the setting at `key` against `rule`, storing and returning the resulting value.
    ///
    /// A value rejected by the validation function is left untouched in the context.
    pub fn check(&self, key: &str, rule: CheckRule) -> Result<Option<Value>, CheckError> {
        let mut value = self.get(key).or(rule.default);

        if value.is_none() && (rule.is_mandatory || rule.validate.is_some()) {
            return Err(MissingSetting {
                key: key.to_string(),
            }
            .into());
        }

        if let (Some(candidate), Some(validate)) = (&value, &rule.validate) {
            if !validate(candidate) {
                return Err(InvalidSetting {
                    key: key.to_string(),
                }
                .into());
            }
        }

        if rule.filter {
            value = value.and_then(|value| resolve_environment(key, value));
        }

        debug!(key = %key, value = ?value, "Checked setting");
        self.set(key, value.clone().unwrap_or(Value::Null));
        Ok(value)
    }
}

/// Replace a `$NAME` string by the content of the environment variable `NAME`.
fn resolve_environment(key: &str, value: Value) -> Option<Value> {
    let Some(name) = value.as_str().and_then(|text| text.strip_prefix('$')) else {
        return Some(value);
    };

    match std::env::var(name) {
        Ok(resolved) => Some(Value::String(resolved)),
        Err(_) => {
            warn!(key = %key, variable = %name, "Environment variable is not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn spark_settings() -> Value {
        json!({
            "DEBUG": true,
            "spark": {
                "room": "My preferred room",
                "team": "Anchor team",
                "token": "hkNWEtMJNkODk3ZDZLOGQ0OVGlZWU1NmYtyY",
                "webhook": "http://73a1e282.ngrok.io",
            },
            "server": {
                "port": 80,
                "url": "http://www.acme.com/",
            },
        })
    }

    #[test]
    fn test_apply_flattens_sections() {
        let context = Context::new();
        assert_eq!(context.get("general.port"), None);

        context.apply(spark_settings());

        assert_eq!(context.get("general.DEBUG"), Some(json!(true)));
        assert_eq!(context.get("spark.room"), Some(json!("My preferred room")));
        assert_eq!(context.get("server.port"), Some(json!(80)));
        assert_eq!(context.get("server.url"), Some(json!("http://www.acme.com/")));
    }

    #[test]
    fn test_clear() {
        let context = Context::with_settings(spark_settings());
        assert!(!context.is_empty());

        context.clear();

        assert!(context.is_empty());
        assert_eq!(context.get("spark.room"), None);
    }

    #[test]
    fn test_has() {
        let context = Context::with_settings(spark_settings());

        assert!(!context.has("hello"));
        assert!(context.has("spark"));
        assert!(context.has("spark.team"));
        assert!(!context.has(".token"));
        assert!(!context.has("spa"));
    }

    #[test]
    fn test_getter() {
        let context = Context::new();

        assert_eq!(context.get("hello"), None);
        assert_eq!(context.get_or("hello", "whatever"), json!("whatever"));

        context.set("hello", "world");
        assert_eq!(context.get("hello"), Some(json!("world")));
        assert_eq!(context.get_or("hello", "whatever"), json!("world"));

        // null is read back as absent
        context.set("special", Value::Null);
        assert_eq!(context.get_or("special", json!([])), json!([]));
    }

    #[test]
    fn test_gauge() {
        let context = Context::new();

        context.set("gauge", "world");
        assert_eq!(context.increment("gauge", 1), 1);
        assert_eq!(context.get("gauge"), Some(json!(1)));

        assert_eq!(context.decrement("gauge", 2), -1);
        assert_eq!(context.increment("gauge", 4), 3);
        assert_eq!(context.decrement("gauge", 10), -7);
        assert_eq!(context.increment("gauge", 27), 20);
        assert_eq!(context.get_or("gauge", "world"), json!(20));
    }

    #[test]
    fn test_gauge_overflow() {
        let context = Context::new();

        context.set("gauge", i64::MAX);
        assert_eq!(context.increment("gauge", 1), i64::MAX);
        assert_eq!(context.get("gauge"), Some(json!(i64::MAX)));

        context.set("gauge", i64::MIN);
        assert_eq!(context.decrement("gauge", 1), i64::MIN);
        assert_eq!(context.increment("gauge", i64::MIN), i64::MIN);

        context.set("gauge", 0);
        assert_eq!(context.decrement("gauge", i64::MIN), i64::MAX);
    }

    #[test]
    fn test_decrement_from_nothing() {
        let context = Context::new();
        assert_eq!(context.decrement("gauge", 1), -1);
    }

    #[test]
    fn test_switch() {
        let context = Context::new();
        assert!(context.is_switched_on());

        context.set(SWITCH_KEY, "off");
        assert!(!context.is_switched_on());

        context.set(SWITCH_KEY, "on");
        assert!(context.is_switched_on());
    }

    #[test]
    fn test_check_defaults() {
        let context = Context::with_settings(spark_settings());

        let room = context
            .check("spark.room", CheckRule::builder().is_mandatory(true).build())
            .unwrap();
        assert_eq!(room, Some(json!("My preferred room")));

        context.check("spark.not_present", CheckRule::default()).unwrap();
        assert_eq!(context.get("spark.not_present"), None);

        context
            .check("spark.absent_list", CheckRule::builder().default(json!([])).build())
            .unwrap();
        assert_eq!(context.get("spark.absent_list"), Some(json!([])));

        context
            .check("spark.absent_text", CheckRule::builder().default(json!("*born")).build())
            .unwrap();
        assert_eq!(context.get("spark.absent_text"), Some(json!("*born")));
    }

    #[test]
    fn test_check_missing() {
        let context = Context::new();

        let result = context.check("spark.unknown", CheckRule::builder().is_mandatory(true).build());
        assert!(matches!(result, Err(CheckError::Missing(MissingSetting { .. }))));

        let rule = CheckRule::builder()
            .validate(Box::new(|value: &Value| value.is_string()))
            .build();
        let result = context.check("spark.unknown", rule);
        assert!(matches!(result, Err(CheckError::Missing(_))));
    }

    #[test]
    fn test_check_invalid_keeps_value() {
        let context = Context::with_settings(spark_settings());

        let rule = CheckRule::builder()
            .validate(Box::new(|value: &Value| {
                value.as_str().is_some_and(|text| text.starts_with("http"))
            }))
            .build();
        context.check("spark.webhook", rule).unwrap();

        let rule = CheckRule::builder()
            .validate(Box::new(|value: &Value| {
                value.as_str().is_some_and(|text| text.len() == 32)
            }))
            .build();
        let result = context.check("spark.token", rule);
        assert!(matches!(result, Err(CheckError::Invalid(InvalidSetting { .. }))));
        assert_eq!(
            context.get("spark.token"),
            Some(json!("hkNWEtMJNkODk3ZDZLOGQ0OVGlZWU1NmYtyY"))
        );
    }

    #[test]
    fn test_check_filter_environment() {
        let context = Context::new();
        context.set("spark.literal", "plain text");
        context.set("spark.missing", "$SHELLBOT_TEST_SURELY_UNSET_VARIABLE");
        context.set("spark.path", "$PATH");

        context
            .check("spark.literal", CheckRule::builder().filter(true).build())
            .unwrap();
        assert_eq!(context.get("spark.literal"), Some(json!("plain text")));

        context
            .check("spark.missing", CheckRule::builder().filter(true).build())
            .unwrap();
        assert_eq!(context.get("spark.missing"), None);

        if let Ok(path) = std::env::var("PATH") {
            context
                .check("spark.path", CheckRule::builder().filter(true).build())
                .unwrap();
            assert_eq!(context.get("spark.path"), Some(json!(path)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments() {
        const WORKERS: i64 = 8;
        const ROUNDS: i64 = 250;

        let context = Arc::new(Context::new());

        let workers = (0..WORKERS).map(|_| {
            let context = Arc::clone(&context);
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    context.increment("gauge", 1);
                    tokio::task::yield_now().await;
                }
            })
        });

        for result in futures::future::join_all(workers).await {
            result.unwrap();
        }

        assert_eq!(context.get("gauge"), Some(json!(WORKERS * ROUNDS)));
    }

    #[test]
    fn test_concurrent_threads_mixed() {
        let context = Arc::new(Context::new());

        let threads: Vec<_> = (0..4)
            .map(|worker| {
                let context = Arc::clone(&context);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if worker % 2 == 0 {
                            context.increment("gauge", 3);
                        } else {
                            context.decrement("gauge", 1);
                        }
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(context.get("gauge"), Some(json!(2 * 500 * 3 - 2 * 500)));
    }
}
