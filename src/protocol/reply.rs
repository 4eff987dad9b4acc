//! Reply text and the literal patterns scanned out of it.
//!
//! Replies are semi-structured: a value line, sometimes preceded by an empty
//! line, followed by the status line when the system-error query was appended.
//!
//! ```text
//! "\n1\n0, \"No error\""    link active
//! "OFF\n0, \"No error\""     laser off
//! "-113, \"Undefined header; could not find\""
//! ```
//!
//! The substrings checked below are the instrument's de-facto contract and are
//! matched literally.

use std::fmt;

/// Present in a link-status reply when the PCS link is up.
pub const LINK_ACTIVE_PATTERN: &str = "\n1\n";

/// Present in a link-status reply while waiting for the link.
pub const LINK_WAITING_PATTERN: &str = "\n0\n";

/// Toggle state literal for an enabled laser or running traffic generator.
pub const STATE_ON: &str = "ON";

/// Toggle state literal for a disabled laser or stopped traffic generator.
pub const STATE_OFF: &str = "OFF";

/// Text returned by one transaction, with one trailing newline removed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    text: String,
}

impl Reply {
    /// Build a reply from raw transport bytes.
    ///
    /// Bytes are decoded lossily and exactly one trailing `\n` is stripped.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let decoded = String::from_utf8_lossy(bytes);
        let text = decoded.strip_suffix('\n').unwrap_or(&decoded);
        Self {
            text: text.to_string(),
        }
    }

    /// Raw reply text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consume the reply, returning its text.
    pub fn into_string(self) -> String {
        self.text
    }

    /// Whether the instrument sent nothing before the read finished.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Literal substring test.
    pub fn contains(&self, pattern: &str) -> bool {
        self.text.contains(pattern)
    }

    /// Newline-separated fields, including empty ones.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    /// Field at a declared position, counting empty lines.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.lines().nth(index)
    }

    /// First non-empty field with surrounding whitespace removed.
    pub fn first_value(&self) -> Option<&str> {
        self.lines().map(str::trim).find(|line| !line.is_empty())
    }

    /// The reply on a single line, for log records.
    pub fn flattened(&self) -> String {
        self.text.replace('\n', "")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Two-valued state of a laser or traffic generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    /// Enabled / running.
    On,
    /// Disabled / stopped.
    Off,
}

impl ToggleState {
    /// Literal the instrument uses for this state.
    pub const fn literal(self) -> &'static str {
        match self {
            ToggleState::On => STATE_ON,
            ToggleState::Off => STATE_OFF,
        }
    }

    /// The other state.
    pub const fn opposite(self) -> Self {
        match self {
            ToggleState::On => ToggleState::Off,
            ToggleState::Off => ToggleState::On,
        }
    }

    /// Scan a status reply.
    ///
    /// `OFF` is checked first because it is the longer literal; `None` means
    /// neither literal appears and the state is unknown.
    pub fn scan(reply: &Reply) -> Option<Self> {
        if reply.contains(STATE_OFF) {
            Some(ToggleState::Off)
        } else if reply.contains(STATE_ON) {
            Some(ToggleState::On)
        } else {
            None
        }
    }
}

impl fmt::Display for ToggleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

/// PCS link state read from a link-status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// `"\n1\n"` present.
    Active,
    /// `"\n0\n"` present; the instrument is still waiting for a link.
    Waiting,
    /// Neither pattern matched (fail state `9.91e+37`, error replies, or an
    /// application that does not report link status).
    Unknown,
}

impl LinkState {
    /// Scan a link-status reply.
    pub fn scan(reply: &Reply) -> Self {
        if reply.contains(LINK_ACTIVE_PATTERN) {
            LinkState::Active
        } else if reply.contains(LINK_WAITING_PATTERN) {
            LinkState::Waiting
        } else {
            LinkState::Unknown
        }
    }

    /// Whether the link is known to be up.
    pub fn is_active(self) -> bool {
        matches!(self, LinkState::Active)
    }
}
