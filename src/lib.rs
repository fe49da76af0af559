//! screen-lock-guard: keep the screen locker out of the way while applications
//! inhibit it over D-Bus.
//!
//! Applications ask for the screensaver to stay away through
//! `org.freedesktop.ScreenSaver.Inhibit` or
//! `org.freedesktop.PowerManagement.Inhibit.Inhibit`. Lockers such as
//! `xscreensaver` do not listen to either interface, so this crate watches the
//! session bus and drives the locker itself.
//!
//! Usage:
//! ```no_run
//! use std::sync::Arc;
//! use screen_lock_guard::{CommandControl, Config, Controller, Policy, supervisor};
//!
//! # async fn run() -> Result<(), screen_lock_guard::Error> {
//! let config = Config::default();
//! let control = CommandControl::from_config(&config)?;
//! let controller = Arc::new(Controller::new(control, config.strategy()));
//! let policy = Arc::new(Policy::from_config(&config));
//! supervisor::run(controller, policy, config.subscriptions(), async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

use std::process::ExitStatus;

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix as sys;
    } else {
        mod portable;
        use portable as sys;
    }
}

mod bus;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod feed;
pub mod policy;
pub mod process;
pub mod record;
pub mod supervisor;
pub mod watcher;

pub use bus::BusFeed;
pub use config::{Config, FeedKind, StrategyKind};
pub use controller::{Controller, ProcessControl, Snapshot, Strategy};
pub use decoder::{Decoder, Line, Records};
pub use feed::{AnyFeed, Arg, BusMessage, Feed, FeedEvent, Subscribe, Subscription};
pub use policy::{BlacklistRule, Decision, Engine, Policy, WatchedInterface};
pub use process::CommandControl;
pub use record::{Member, Record};

/// Error type for the daemon and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failure talking to a child process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// D-Bus error (native feed).
    #[error("D-Bus error: {0}")]
    Dbus(String),
    /// A configured command could not be spawned.
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// A subscription feed's process exited unsuccessfully.
    #[error("feed `{command}` exited with {status}")]
    FeedExited { command: String, status: ExitStatus },
    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A watcher task panicked.
    #[error("watcher `{0}` panicked")]
    WatcherPanicked(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
