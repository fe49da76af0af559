use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::Result;
use crate::config::Config;
use crate::controller::{Controller, ProcessControl};
use crate::record::{Member, Record};

/// A bus interface whose inhibit calls are honored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WatchedInterface {
    pub name: String,
    /// Object path to restrict the subscription to. KDE exports the
    /// ScreenSaver object at both `/ScreenSaver` and
    /// `/org/freedesktop/ScreenSaver`, so the default is no restriction.
    #[serde(default)]
    pub path: Option<String>,
}

impl WatchedInterface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    /// Match rule in the textual form accepted by `dbus-monitor`.
    pub fn match_rule(&self) -> String {
        match &self.path {
            Some(path) => format!("interface='{}',path='{}'", self.name, path),
            None => format!("interface='{}'", self.name),
        }
    }
}

/// Case-sensitive substring matched against the requesting application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlacklistRule(String);

impl BlacklistRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn pattern(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, origin: &str) -> bool {
        origin.contains(&self.0)
    }
}

/// What to do with a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Suppress the locker.
    Inhibit,
    /// Inhibit from a blacklisted origin; consumed without action.
    Blacklisted { pattern: String },
    /// Let the locker run again.
    Release,
    /// Not a terminal event; keep accumulating.
    Ignore,
}

impl Decision {
    pub fn is_handled(&self) -> bool {
        !matches!(self, Self::Ignore)
    }
}

/// Which interfaces are watched and which origins are never honored.
#[derive(Clone, Debug)]
pub struct Policy {
    interfaces: Vec<WatchedInterface>,
    blacklist: Vec<BlacklistRule>,
}

impl Policy {
    /// Builds a policy from explicit interfaces and blacklist rules.
    pub fn new(interfaces: Vec<WatchedInterface>, blacklist: Vec<BlacklistRule>) -> Self {
        Self {
            interfaces,
            blacklist,
        }
    }

    /// Builds a policy from the `interfaces` and `blacklist` settings.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.interfaces.clone(),
            config.blacklist.iter().map(BlacklistRule::new).collect(),
        )
    }

    pub fn interfaces(&self) -> &[WatchedInterface] {
        &self.interfaces
    }

    /// Whether `interface` is one of the watched interfaces.
    pub fn watches(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|watched| watched.name == interface)
    }

    /// First blacklist rule matching `origin`, if any.
    pub fn blacklisted(&self, origin: &str) -> Option<&BlacklistRule> {
        self.blacklist.iter().find(|rule| rule.matches(origin))
    }

    /// Classifies a record without side effects. Only complete `Inhibit`
    /// and `UnInhibit` records on watched interfaces are acted on.
    pub fn decide(&self, record: &Record) -> Decision {
        if !self.watches(&record.interface) {
            return Decision::Ignore;
        }
        match (&record.member, &record.origin, &record.reason) {
            (Member::Inhibit, Some(origin), Some(_)) => match self.blacklisted(origin) {
                Some(rule) => Decision::Blacklisted {
                    pattern: rule.pattern().to_string(),
                },
                None => Decision::Inhibit,
            },
            (Member::UnInhibit, _, _) => Decision::Release,
            _ => Decision::Ignore,
        }
    }
}

/// Applies the policy to records from one watcher and drives the shared
/// controller.
pub struct Engine<P: ProcessControl> {
    policy: Arc<Policy>,
    controller: Arc<Controller<P>>,
}

impl<P: ProcessControl> Clone for Engine<P> {
    fn clone(&self) -> Self {
        Self {
            policy: Arc::clone(&self.policy),
            controller: Arc::clone(&self.controller),
        }
    }
}

impl<P: ProcessControl> Engine<P> {
    /// Creates an engine sharing `controller` with the other watchers.
    pub fn new(policy: Arc<Policy>, controller: Arc<Controller<P>>) -> Self {
        Self { policy, controller }
    }

    /// Returns `true` when the record was consumed and the accumulator should
    /// be reset.
    pub async fn handle(&self, record: &Record) -> Result<bool> {
        let interface = record.interface.as_str();
        let member = record.member.as_str();
        let origin = record.origin.as_deref();
        let reason = record.reason.as_deref();

        let decision = self.policy.decide(record);
        match &decision {
            Decision::Inhibit => {
                info!(interface, member, origin, reason, "inhibit requested, suppressing lock");
                self.controller.suppress(true).await?;
            }
            Decision::Blacklisted { pattern } => {
                info!(
                    interface,
                    member,
                    origin,
                    reason,
                    pattern = pattern.as_str(),
                    "origin is blacklisted, ignoring inhibit"
                );
            }
            Decision::Release => {
                info!(interface, member, "inhibit released, allowing screen lock");
                self.controller.suppress(false).await?;
            }
            Decision::Ignore => {
                debug!(interface, member, origin, reason, "record not actionable");
            }
        }
        Ok(decision.is_handled())
    }
}
