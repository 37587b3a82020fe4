//! An ordered log of the messages produced by a build.

use std::fmt;

/// The severity of a [`BuildMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum LogLevel {
    /// Informational progress of the build.
    Progress,
    /// Something unexpected happened, but the build continued.
    Warning,
    /// The build could not continue.
    Error,
}

/// A single entry of a [`BuildContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildMessage {
    /// The severity of the message.
    pub level: LogLevel,
    /// The message itself.
    pub text: String,
}

impl fmt::Display for BuildMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            LogLevel::Progress => write!(f, "{}", self.text),
            LogLevel::Warning => write!(f, "warning: {}", self.text),
            LogLevel::Error => write!(f, "error: {}", self.text),
        }
    }
}

/// Collects the messages of a build so callers can inspect them afterwards.
///
/// Every message is forwarded to [`tracing`] as well, whether or not the log is enabled.
#[derive(Debug, Clone)]
pub struct BuildContext {
    messages: Vec<BuildMessage>,
    enabled: bool,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildContext {
    /// Creates an empty, enabled log.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            enabled: true,
        }
    }

    /// Records a progress message.
    pub fn log(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!("{text}");
        self.push(LogLevel::Progress, text);
    }

    /// Records a warning.
    pub fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!("{text}");
        self.push(LogLevel::Warning, text);
    }

    /// Records an error.
    pub fn error(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::error!("{text}");
        self.push(LogLevel::Error, text);
    }

    fn push(&mut self, level: LogLevel, text: String) {
        if self.enabled {
            self.messages.push(BuildMessage { level, text });
        }
    }

    /// The recorded messages, oldest first.
    pub fn messages(&self) -> &[BuildMessage] {
        &self.messages
    }

    /// The number of recorded messages.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Whether an error has been recorded.
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.level == LogLevel::Error)
    }

    /// Clears the recorded messages.
    pub fn reset_log(&mut self) {
        self.messages.clear();
    }

    /// Enables or disables recording. Disabled logs still forward to [`tracing`].
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether messages are currently recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_keep_their_order() {
        let mut context = BuildContext::new();
        context.log("first");
        context.warn("second");
        context.error("third");

        let levels: Vec<_> = context.messages().iter().map(|m| m.level).collect();
        assert_eq!(
            levels,
            [LogLevel::Progress, LogLevel::Warning, LogLevel::Error]
        );
        assert_eq!(context.messages()[1].text, "second");
        assert!(context.has_errors());
    }

    #[test]
    fn disabled_log_records_nothing() {
        let mut context = BuildContext::new();
        context.set_enabled(false);
        context.log("dropped");
        assert_eq!(context.message_count(), 0);

        context.set_enabled(true);
        context.log("kept");
        assert_eq!(context.message_count(), 1);

        context.reset_log();
        assert_eq!(context.message_count(), 0);
    }

    #[test]
    fn display_prefixes_severity() {
        let message = BuildMessage {
            level: LogLevel::Warning,
            text: "no regions".to_string(),
        };
        assert_eq!(message.to_string(), "warning: no regions");
    }
}
