use std::fmt;

pub const INHIBIT_MEMBER: &str = "Inhibit";
pub const UN_INHIBIT_MEMBER: &str = "UnInhibit";

/// Bus member named by a header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Member {
    Inhibit,
    UnInhibit,
    Other(String),
}

impl Member {
    pub fn parse(name: &str) -> Self {
        match name {
            INHIBIT_MEMBER => Self::Inhibit,
            UN_INHIBIT_MEMBER => Self::UnInhibit,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Inhibit => INHIBIT_MEMBER,
            Self::UnInhibit => UN_INHIBIT_MEMBER,
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inhibition request (or release) observed on the bus.
///
/// `origin` is the first string argument (application name), `reason` the
/// second. Both are absent for `UnInhibit`, which carries only a cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub interface: String,
    pub member: Member,
    pub origin: Option<String>,
    pub reason: Option<String>,
}

impl Record {
    pub fn new(interface: impl Into<String>, member: Member) -> Self {
        Self {
            interface: interface.into(),
            member,
            origin: None,
            reason: None,
        }
    }

    /// Adds a positional string argument. Arguments past the second are
    /// dropped.
    pub fn push_param(&mut self, value: String) {
        if self.origin.is_none() {
            self.origin = Some(value);
        } else if self.reason.is_none() {
            self.reason = Some(value);
        }
    }

    pub fn is_complete(&self) -> bool {
        match self.member {
            Member::UnInhibit => true,
            Member::Inhibit => self.origin.is_some() && self.reason.is_some(),
            Member::Other(_) => false,
        }
    }
}
