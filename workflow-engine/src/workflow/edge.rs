//! Edge groups and routing predicates.
//!
//! An edge group is the unit of routing declared on the builder. Predicates
//! are pure functions of a message; an error or a panic inside a predicate
//! counts as "no match" and never aborts the run.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::pregel::executor::ExecutorId;
use crate::pregel::message::{Message, MessagePayload};

/// Condition applied to a JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Value equals expected
    Equals { value: Value },

    /// Value is in set of options
    In { values: Vec<Value> },

    /// String value matches regex pattern
    Matches { pattern: Pattern },

    /// Value is truthy (non-null, non-empty, non-false, non-zero)
    IsTruthy,

    /// Value is falsy
    IsFalsy,

    /// Always true (used for catch-all branches)
    Always,
}

impl Condition {
    pub fn equals(value: impl Into<Value>) -> Self {
        Condition::Equals { value: value.into() }
    }

    pub fn one_of<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Condition::In {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(pattern: impl Into<String>) -> Self {
        Condition::Matches {
            pattern: Pattern::new(pattern),
        }
    }

    /// Evaluate against a value
    ///
    /// `Matches` on a non-string or with an invalid pattern is an error.
    pub fn evaluate(&self, value: &Value) -> Result<bool, String> {
        match self {
            Condition::Equals { value: expected } => Ok(value == expected),
            Condition::In { values } => Ok(values.contains(value)),
            Condition::Matches { pattern } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| format!("cannot match /{}/ against non-string {}", pattern, value))?;
                Ok(pattern.regex()?.is_match(text))
            }
            Condition::IsTruthy => Ok(is_truthy(value)),
            Condition::IsFalsy => Ok(!is_truthy(value)),
            Condition::Always => Ok(true),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals { value } => write!(f, "== {}", value),
            Condition::In { values } => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "in [{}]", items.join(", "))
            }
            Condition::Matches { pattern } => write!(f, "~ /{}/", pattern),
            Condition::IsTruthy => write!(f, "is truthy"),
            Condition::IsFalsy => write!(f, "is falsy"),
            Condition::Always => write!(f, "always"),
        }
    }
}

/// Regex source compiled on first use and cached for later evaluations.
///
/// Serializes as the bare pattern string.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    compiled: OnceLock<Result<Regex, String>>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            compiled: OnceLock::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The compiled regex, or the compile error for an invalid pattern
    pub fn regex(&self) -> Result<&Regex, String> {
        self.compiled
            .get_or_init(|| Regex::new(&self.source).map_err(|e| format!("invalid pattern: {}", e)))
            .as_ref()
            .map_err(Clone::clone)
    }

    #[cfg(test)]
    fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Pattern::new)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
        Value::Null => false,
    }
}

/// Resolve a dotted path inside a payload
fn resolve_field<'a>(payload: &'a Value, path: &str) -> Result<&'a Value, String> {
    let mut current = payload;
    for part in path.split('.') {
        current = match current {
            Value::Object(obj) => obj.get(part),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            _ => None,
        }
        .ok_or_else(|| format!("field '{}' not found", path))?;
    }
    Ok(current)
}

type PredicateFn = Arc<dyn Fn(&Message) -> Result<bool, String> + Send + Sync>;

#[derive(Clone)]
enum PredicateKind {
    Field {
        field: Option<String>,
        condition: Condition,
    },
    Func(PredicateFn),
}

/// Routing predicate over a message, with a label used in diagrams and logs.
#[derive(Clone)]
pub struct Predicate {
    label: String,
    kind: PredicateKind,
}

impl Predicate {
    /// Condition on a dotted field of the payload
    ///
    /// ```ignore
    /// Predicate::field("spam_decision", Condition::equals("Spam"))
    /// ```
    pub fn field(path: impl Into<String>, condition: Condition) -> Self {
        let path = path.into();
        Self {
            label: format!("{} {}", path, condition),
            kind: PredicateKind::Field {
                field: Some(path),
                condition,
            },
        }
    }

    /// Condition on the whole payload
    pub fn payload(condition: Condition) -> Self {
        Self {
            label: condition.to_string(),
            kind: PredicateKind::Field { field: None, condition },
        }
    }

    /// Infallible closure predicate
    pub fn from_fn<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self::try_from_fn(label, move |message| Ok(f(message)))
    }

    /// Fallible closure predicate; an error counts as no match
    pub fn try_from_fn<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Message) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            kind: PredicateKind::Func(Arc::new(f)),
        }
    }

    /// Closure over a decoded payload; a decode failure is an error
    pub fn payload_is<T, F>(label: impl Into<String>, f: F) -> Self
    where
        T: MessagePayload,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::try_from_fn(label, move |message| {
            let payload = message.decode::<T>().map_err(|e| e.to_string())?;
            Ok(f(&payload))
        })
    }

    /// Match every message
    pub fn always() -> Self {
        Self::payload(Condition::Always)
    }

    /// Replace the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate the predicate, converting panics into errors
    pub fn evaluate(&self, message: &Message) -> Result<bool, String> {
        match &self.kind {
            PredicateKind::Field { field, condition } => {
                let value = match field {
                    Some(path) => resolve_field(&message.payload, path)?,
                    None => &message.payload,
                };
                condition.evaluate(value)
            }
            PredicateKind::Func(f) => match catch_unwind(AssertUnwindSafe(|| f(message))) {
                Ok(result) => result,
                Err(panic) => Err(panic_message(panic)),
            },
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("predicate panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("predicate panicked: {}", s)
    } else {
        "predicate panicked".to_string()
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("label", &self.label).finish()
    }
}

/// A predicate paired with the target it routes to.
#[derive(Debug, Clone)]
pub struct Case {
    pub target: ExecutorId,
    pub predicate: Predicate,
}

impl Case {
    pub fn new(target: impl Into<ExecutorId>, predicate: Predicate) -> Self {
        Self {
            target: target.into(),
            predicate,
        }
    }
}

/// A group of edges evaluated together for messages from a source.
#[derive(Debug, Clone)]
pub enum EdgeGroup {
    /// Unconditional single edge
    Direct { from: ExecutorId, to: ExecutorId },

    /// Edge that fires when the predicate holds
    Conditional {
        from: ExecutorId,
        to: ExecutorId,
        predicate: Predicate,
    },

    /// First matching case wins, else the default
    SwitchCase {
        from: ExecutorId,
        cases: Vec<Case>,
        default: Option<ExecutorId>,
    },

    /// Every matching case fires
    MultiSelection { from: ExecutorId, cases: Vec<Case> },

    /// Broadcast to every target
    FanOut { from: ExecutorId, targets: Vec<ExecutorId> },

    /// Collect one result per source before delivering to the target
    FanIn {
        sources: Vec<ExecutorId>,
        target: ExecutorId,
        /// Message kinds buffered as round contributions; empty buffers every kind
        kinds: Vec<String>,
    },
}

impl EdgeGroup {
    /// Executors whose messages this group routes
    pub fn sources(&self) -> Vec<&ExecutorId> {
        match self {
            EdgeGroup::Direct { from, .. }
            | EdgeGroup::Conditional { from, .. }
            | EdgeGroup::SwitchCase { from, .. }
            | EdgeGroup::MultiSelection { from, .. }
            | EdgeGroup::FanOut { from, .. } => vec![from],
            EdgeGroup::FanIn { sources, .. } => sources.iter().collect(),
        }
    }

    /// Every executor this group can deliver to
    pub fn targets(&self) -> Vec<&ExecutorId> {
        match self {
            EdgeGroup::Direct { to, .. } | EdgeGroup::Conditional { to, .. } => vec![to],
            EdgeGroup::SwitchCase { cases, default, .. } => cases
                .iter()
                .map(|c| &c.target)
                .chain(default.iter())
                .collect(),
            EdgeGroup::MultiSelection { cases, .. } => cases.iter().map(|c| &c.target).collect(),
            EdgeGroup::FanOut { targets, .. } => targets.iter().collect(),
            EdgeGroup::FanIn { target, .. } => vec![target],
        }
    }

    /// Whether messages from `id` are routed by this group
    pub fn originates_at(&self, id: &ExecutorId) -> bool {
        self.sources().into_iter().any(|s| s == id)
    }

    /// Whether a fan-in group collects messages of `kind`.
    ///
    /// Always false for other groups.
    pub fn collects(&self, kind: &str) -> bool {
        match self {
            EdgeGroup::FanIn { kinds, .. } => kinds.is_empty() || kinds.iter().any(|k| k == kind),
            _ => false,
        }
    }

    /// Short name for logging and diagrams
    pub fn kind_name(&self) -> &'static str {
        match self {
            EdgeGroup::Direct { .. } => "direct",
            EdgeGroup::Conditional { .. } => "conditional",
            EdgeGroup::SwitchCase { .. } => "switch_case",
            EdgeGroup::MultiSelection { .. } => "multi_selection",
            EdgeGroup::FanOut { .. } => "fan_out",
            EdgeGroup::FanIn { .. } => "fan_in",
        }
    }
}
