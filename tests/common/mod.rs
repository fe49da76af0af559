#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use screen_lock_guard::{BusMessage, Error, Feed, FeedEvent, ProcessControl, Result, Subscribe};

pub const SCREENSAVER: &str = "org.freedesktop.ScreenSaver";
pub const POWER: &str = "org.freedesktop.PowerManagement.Inhibit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Start(usize),
    Terminate(usize),
    Wait(usize),
}

/// Process control that only records what it was asked to do.
#[derive(Default)]
pub struct Recorder {
    next: AtomicUsize,
    events: Mutex<Vec<Event>>,
    deactivations: AtomicUsize,
    stall_next_wait: AtomicBool,
}

impl Recorder {
    /// The first `wait` never completes, like a locker slow to exit.
    pub fn stalling() -> Self {
        let recorder = Self::default();
        recorder.stall_next_wait.store(true, Ordering::SeqCst);
        recorder
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProcessControl for Recorder {
    type Handle = usize;

    fn start(&self) -> Result<usize> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.record(Event::Start(id));
        Ok(id)
    }

    fn terminate(&self, handle: &mut usize) -> Result<()> {
        self.record(Event::Terminate(*handle));
        Ok(())
    }

    async fn wait(&self, handle: &mut usize) -> Result<()> {
        if self.stall_next_wait.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.record(Event::Wait(*handle));
        Ok(())
    }

    async fn deactivate(&self) {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
    }
}

/// How a scripted feed behaves once its events are exhausted.
#[derive(Clone, Debug)]
pub enum Ending {
    Clean,
    Fail(String),
    Hang,
    Panic,
}

pub struct ScriptedFeed {
    label: String,
    events: VecDeque<FeedEvent>,
    ending: Ending,
}

impl ScriptedFeed {
    pub fn new(label: &str, events: Vec<FeedEvent>, ending: Ending) -> Self {
        Self {
            label: label.to_string(),
            events: events.into(),
            ending,
        }
    }

    pub fn lines(label: &str, lines: &[String], ending: Ending) -> Self {
        let events = lines.iter().cloned().map(FeedEvent::Line).collect();
        Self::new(label, events, ending)
    }
}

impl Feed for ScriptedFeed {
    async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        match &self.ending {
            Ending::Clean => Ok(None),
            Ending::Fail(reason) => Err(Error::Dbus(reason.clone())),
            Ending::Hang => std::future::pending().await,
            Ending::Panic => panic!("scripted feed panicked"),
        }
    }
}

impl Subscribe for ScriptedFeed {
    type Feed = Self;

    fn label(&self) -> String {
        self.label.clone()
    }

    async fn subscribe(self) -> Result<Self> {
        Ok(self)
    }
}

pub fn header(interface: &str, member: &str) -> String {
    format!(
        "method call time=1700000000.000001 sender=:1.42 -> destination={interface} serial=9 \
         path=/org/freedesktop/ScreenSaver; interface={interface}; member={member}"
    )
}

pub fn param(value: &str) -> String {
    format!("   string \"{value}\"")
}

pub fn message(interface: &str, member: &str, args: Vec<screen_lock_guard::Arg>) -> FeedEvent {
    FeedEvent::Message(BusMessage {
        interface: Some(interface.to_string()),
        member: Some(member.to_string()),
        args,
    })
}
