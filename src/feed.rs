//! Subscription feeds: where bus traffic comes from.
//!
//! Two shapes are accepted. The `dbus-monitor` adapter yields raw text lines;
//! the native client yields already-parsed [`BusMessage`]s. Both are reduced
//! to the same [`Line`] classification before decoding.

use std::future::Future;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader, Split};
use tokio::process::{Child, ChildStdout};
use tracing::debug;

use crate::bus::BusFeed;
use crate::decoder::Line;
use crate::policy::WatchedInterface;
use crate::process::{command, spawn};
use crate::{Error, Result};

/// Loosely-typed message argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    Str(String),
    Other,
}

/// A message decoded by a native bus client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BusMessage {
    pub interface: Option<String>,
    pub member: Option<String>,
    pub args: Vec<Arg>,
}

impl BusMessage {
    /// A header followed by one parameter per string argument. Messages
    /// without an interface or member (returns, errors) are unrecognized.
    pub fn lines(&self) -> Vec<Line> {
        let (Some(interface), Some(member)) = (&self.interface, &self.member) else {
            return vec![Line::Unrecognized];
        };
        let params = self.args.iter().filter_map(|arg| match arg {
            Arg::Str(value) => Some(Line::Parameter(value.clone())),
            Arg::Other => None,
        });
        std::iter::once(Line::header(interface.as_str(), member))
            .chain(params)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedEvent {
    Line(String),
    Message(BusMessage),
}

impl FeedEvent {
    pub fn into_lines(self) -> Vec<Line> {
        match self {
            Self::Line(line) => vec![Line::parse(&line)],
            Self::Message(message) => message.lines(),
        }
    }
}

/// An ordered stream of bus events. `Ok(None)` marks a clean end.
pub trait Feed: Send {
    fn next_event(&mut self) -> impl Future<Output = Result<Option<FeedEvent>>> + Send;
}

/// Reads the output of a `dbus-monitor` child line by line.
pub struct MonitorCommandFeed {
    command: String,
    child: Child,
    output: Split<BufReader<ChildStdout>>,
    finished: bool,
}

impl MonitorCommandFeed {
    pub fn spawn(argv: &[String]) -> Result<Self> {
        if argv.is_empty() {
            return Err(Error::Config("monitor command is empty".to_string()));
        }
        let mut cmd = command(argv);
        cmd.stdout(Stdio::piped()).kill_on_drop(true);
        let mut child = spawn(argv, &mut cmd)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("monitor stdout not captured")))?;
        debug!(pid = child.id(), command = %argv.join(" "), "monitor started");
        Ok(Self {
            command: argv.join(" "),
            child,
            output: BufReader::new(stdout).split(b'\n'),
            finished: false,
        })
    }
}

impl Feed for MonitorCommandFeed {
    async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        if self.finished {
            return Ok(None);
        }
        if let Some(line) = self.output.next_segment().await? {
            return Ok(Some(FeedEvent::Line(String::from_utf8_lossy(&line).into_owned())));
        }
        self.finished = true;
        let status = self.child.wait().await?;
        if status.success() {
            Ok(None)
        } else {
            Err(Error::FeedExited {
                command: self.command.clone(),
                status,
            })
        }
    }
}

/// Something the supervisor can open into a feed.
pub trait Subscribe: Send + 'static {
    type Feed: Feed + 'static;

    fn label(&self) -> String;

    fn subscribe(self) -> impl Future<Output = Result<Self::Feed>> + Send;
}

/// Subscription to one or more watched interfaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subscription {
    /// Spawn `command` with one match rule per interface appended.
    DbusMonitor {
        command: Vec<String>,
        interfaces: Vec<WatchedInterface>,
    },
    /// Become a monitor on a native session bus connection.
    Native { interfaces: Vec<WatchedInterface> },
}

impl Subscription {
    pub fn interfaces(&self) -> &[WatchedInterface] {
        match self {
            Self::DbusMonitor { interfaces, .. } | Self::Native { interfaces } => interfaces,
        }
    }

    /// Full `dbus-monitor` invocation, or `None` for native subscriptions.
    pub fn monitor_argv(&self) -> Option<Vec<String>> {
        let Self::DbusMonitor {
            command,
            interfaces,
        } = self
        else {
            return None;
        };
        let rules = interfaces.iter().map(WatchedInterface::match_rule);
        Some(command.iter().cloned().chain(rules).collect())
    }
}

impl Subscribe for Subscription {
    type Feed = AnyFeed;

    fn label(&self) -> String {
        self.interfaces()
            .iter()
            .map(|watched| watched.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn subscribe(self) -> Result<AnyFeed> {
        match self.monitor_argv() {
            Some(argv) => MonitorCommandFeed::spawn(&argv).map(AnyFeed::Monitor),
            None => BusFeed::connect(self.interfaces()).await.map(AnyFeed::Bus),
        }
    }
}

pub enum AnyFeed {
    Monitor(MonitorCommandFeed),
    Bus(BusFeed),
}

impl Feed for AnyFeed {
    async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        match self {
            Self::Monitor(feed) => feed.next_event().await,
            Self::Bus(feed) => feed.next_event().await,
        }
    }
}
