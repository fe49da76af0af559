use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::controller::Strategy;
use crate::feed::Subscription;
use crate::policy::WatchedInterface;
use crate::{Error, Result};

pub const SCREENSAVER_INTERFACE: &str = "org.freedesktop.ScreenSaver";
pub const POWER_MANAGEMENT_INTERFACE: &str = "org.freedesktop.PowerManagement.Inhibit";
pub const DEFAULT_DISRUPT_INTERVAL_SECS: u64 = 540;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Stop the locker while inhibited.
    #[default]
    Toggle,
    /// Keep the locker running and periodically deactivate it while inhibited.
    Disrupt,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FeedKind {
    /// Parse the output of `dbus-monitor`.
    #[default]
    DbusMonitor,
    /// Monitor the session bus directly.
    Native,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    pub strategy: StrategyKind,
    pub feed: FeedKind,
    pub interfaces: Vec<WatchedInterface>,
    /// Substrings of application names whose inhibit requests are ignored.
    pub blacklist: Vec<String>,
    pub lock_command: Vec<String>,
    pub deactivate_command: Vec<String>,
    pub monitor_command: Vec<String>,
    pub disrupt_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            feed: FeedKind::default(),
            interfaces: vec![
                WatchedInterface::new(POWER_MANAGEMENT_INTERFACE),
                WatchedInterface::new(SCREENSAVER_INTERFACE),
            ],
            blacklist: argv(&["My SDL application", "/usr/bin/gpmdp"]),
            lock_command: argv(&["xscreensaver", "-no-splash"]),
            deactivate_command: argv(&["xscreensaver-command", "-deactivate"]),
            monitor_command: argv(&["dbus-monitor", "--session"]),
            disrupt_interval_secs: DEFAULT_DISRUPT_INTERVAL_SECS,
        }
    }
}

fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            return Err(Error::Config("no interfaces to watch".to_string()));
        }
        if let Some(watched) = self.interfaces.iter().find(|w| w.name.is_empty()) {
            return Err(Error::Config(format!("empty interface name in {watched:?}")));
        }
        if self.blacklist.iter().any(String::is_empty) {
            return Err(Error::Config(
                "empty blacklist entry would match every application".to_string(),
            ));
        }
        for (key, command) in [
            ("lock-command", &self.lock_command),
            ("deactivate-command", &self.deactivate_command),
            ("monitor-command", &self.monitor_command),
        ] {
            if command.is_empty() {
                return Err(Error::Config(format!("{key} is empty")));
            }
        }
        if self.disrupt_interval_secs == 0 {
            return Err(Error::Config(
                "disrupt-interval-secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn strategy(&self) -> Strategy {
        match self.strategy {
            StrategyKind::Toggle => Strategy::Toggle,
            StrategyKind::Disrupt => Strategy::Disrupt {
                interval: Duration::from_secs(self.disrupt_interval_secs),
            },
        }
    }

    /// One subscription per interface for the toggle strategy, a single
    /// multiplexed one for the disrupt strategy.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let groups: Vec<Vec<WatchedInterface>> = match self.strategy {
            StrategyKind::Toggle => self.interfaces.iter().map(|w| vec![w.clone()]).collect(),
            StrategyKind::Disrupt => vec![self.interfaces.clone()],
        };
        groups
            .into_iter()
            .map(|interfaces| match self.feed {
                FeedKind::DbusMonitor => Subscription::DbusMonitor {
                    command: self.monitor_command.clone(),
                    interfaces,
                },
                FeedKind::Native => Subscription::Native { interfaces },
            })
            .collect()
    }
}
