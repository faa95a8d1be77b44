//! Structured operation results.
//!
//! Every plugin call, hook and workflow produces a [`PluginResult`]: a status
//! code plus an ordered message log. Message order is observable by callers
//! and survives JSON round-trips unchanged.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Severity tag carried by every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Error,
    Warn,
    Debug,
    /// Output of an external command
    Cmd,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Debug => "DEBUG",
            Self::Cmd => "CMD",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Self::Info),
            "ERROR" => Ok(Self::Error),
            "WARN" => Ok(Self::Warn),
            "DEBUG" => Ok(Self::Debug),
            "CMD" => Ok(Self::Cmd),
            other => Err(format!(
                "invalid message level '{}', must be INFO|ERROR|WARN|DEBUG|CMD",
                other
            )),
        }
    }
}

/// A single timestamped log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unix seconds
    #[serde(rename = "time")]
    pub timestamp: i64,

    pub level: Level,

    #[serde(rename = "message")]
    pub text: String,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(level: Level, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            level,
            text: text.into(),
        }
    }

    /// Parse a `<LEVEL><whitespace><text>` line.
    ///
    /// Returns `None` when the first token is not a known level or no
    /// whitespace separates it from the text.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_start();
        let split = line.find(char::is_whitespace)?;
        let (token, rest) = line.split_at(split);
        let level = token.parse::<Level>().ok()?;
        Some(Self::new(level, rest.trim_start()))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level, self.text)
    }
}

/// Parse captured process output, silently dropping malformed lines.
pub fn parse_lines<I, S>(lines: I) -> Vec<Message>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| Message::parse_line(line.as_ref()))
        .collect()
}

/// Put a single message in front of an existing log.
pub fn prepend_message(message: Message, messages: Vec<Message>) -> Vec<Message> {
    prepend_messages(vec![message], messages)
}

/// Concatenate `prefix` followed by `messages`, preserving both orders.
pub fn prepend_messages(mut prefix: Vec<Message>, messages: Vec<Message>) -> Vec<Message> {
    prefix.extend(messages);
    prefix
}

/// Outcome of an operation: code 0 is success, anything else is failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResult {
    #[serde(default)]
    pub code: i32,

    #[serde(default)]
    pub messages: Vec<Message>,
}

impl PluginResult {
    /// Successful result with no messages
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn new(code: i32, messages: Vec<Message>) -> Self {
        Self { code, messages }
    }

    /// Failed result (code 1) carrying a single ERROR message
    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            code: 1,
            messages: vec![Message::new(Level::Error, text)],
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    pub fn has_error_message(&self) -> bool {
        self.messages.iter().any(|m| m.level == Level::Error)
    }

    /// Append a message stamped with the current time
    pub fn push(&mut self, level: Level, text: impl Into<String>) {
        self.messages.push(Message::new(level, text));
    }

    /// Builder form of [`push`](Self::push)
    pub fn with_message(mut self, level: Level, text: impl Into<String>) -> Self {
        self.push(level, text);
        self
    }

    /// Record a failure code. The first nonzero code wins.
    pub fn fail(&mut self, code: i32) {
        if self.code == 0 {
            self.code = code;
        }
    }

    /// Append another result's messages and adopt its code if none is set yet.
    pub fn absorb(&mut self, other: PluginResult) {
        self.fail(other.code);
        self.messages.extend(other.messages);
    }
}
