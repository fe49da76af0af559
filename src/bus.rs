use futures_util::StreamExt;
use zbus::fdo::MonitoringProxy;
use zbus::zvariant::{Structure, Value};
use zbus::{Connection, MatchRule, Message, MessageStream};

use crate::feed::{Arg, BusMessage, Feed, FeedEvent};
use crate::policy::WatchedInterface;
use crate::{Error, Result};

fn dbus_error(err: impl std::fmt::Display) -> Error {
    Error::Dbus(err.to_string())
}

/// Session bus connection switched into monitor mode.
///
/// A monitor connection only receives; the connection is kept alive for as
/// long as the stream is read.
pub struct BusFeed {
    _conn: Connection,
    stream: MessageStream,
}

impl BusFeed {
    pub async fn connect(interfaces: &[WatchedInterface]) -> Result<Self> {
        let rules = interfaces
            .iter()
            .map(match_rule)
            .collect::<zbus::Result<Vec<_>>>()
            .map_err(dbus_error)?;

        let conn = Connection::session().await.map_err(dbus_error)?;
        // Subscribe before becoming a monitor so nothing is missed in between.
        let stream = MessageStream::from(&conn);
        MonitoringProxy::new(&conn)
            .await
            .map_err(dbus_error)?
            .become_monitor(&rules, 0)
            .await
            .map_err(dbus_error)?;

        Ok(Self {
            _conn: conn,
            stream,
        })
    }
}

fn match_rule(watched: &WatchedInterface) -> zbus::Result<MatchRule<'static>> {
    let builder = MatchRule::builder().interface(watched.name.clone())?;
    let builder = match &watched.path {
        Some(path) => builder.path(path.clone())?,
        None => builder,
    };
    Ok(builder.build())
}

fn decode(msg: &Message) -> BusMessage {
    let header = msg.header();
    let body = msg.body();
    // Bodies without arguments do not deserialize into a structure.
    let args = match body.deserialize::<Structure<'_>>() {
        Ok(fields) => fields.fields().iter().map(decode_arg).collect(),
        Err(_) => Vec::new(),
    };
    BusMessage {
        interface: header.interface().map(|name| name.to_string()),
        member: header.member().map(|name| name.to_string()),
        args,
    }
}

fn decode_arg(value: &Value<'_>) -> Arg {
    match value {
        Value::Str(value) => Arg::Str(value.as_str().to_owned()),
        _ => Arg::Other,
    }
}

impl Feed for BusFeed {
    async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        match self.stream.next().await {
            Some(Ok(msg)) => Ok(Some(FeedEvent::Message(decode(&msg)))),
            Some(Err(err)) => Err(dbus_error(err)),
            None => Ok(None),
        }
    }
}
