//! Lifecycle of the screen locker and of the disruption timer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::Result;

/// OS surface used to run the locker.
pub trait ProcessControl: Send + Sync + 'static {
    type Handle: Send + 'static;

    /// Spawns the locker.
    fn start(&self) -> Result<Self::Handle>;

    /// Asks the process to exit. Does not wait.
    fn terminate(&self, handle: &mut Self::Handle) -> Result<()>;

    /// Resolves once the process has exited and been reaped.
    fn wait(&self, handle: &mut Self::Handle) -> impl Future<Output = Result<()>> + Send;

    /// Forces an engaged locker back to the unlocked state. Failures are the
    /// implementation's to report.
    fn deactivate(&self) -> impl Future<Output = ()> + Send;
}

/// How suppression is carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Stop the locker while inhibited, start it again on release.
    Toggle,
    /// Keep the locker running and deactivate it every `interval` while
    /// inhibited.
    Disrupt { interval: Duration },
}

/// Point-in-time view of the controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub process_running: bool,
    pub disruption_armed: bool,
    pub inhibited: bool,
}

struct State<H> {
    process: Option<H>,
    timer: Option<JoinHandle<()>>,
    inhibited: bool,
}

/// Owns the locker process and the disruption timer. Every transition runs
/// under one lock, so concurrent watchers cannot interleave half-done changes.
pub struct Controller<P: ProcessControl> {
    control: Arc<P>,
    strategy: Strategy,
    state: Mutex<State<P::Handle>>,
}

impl<P: ProcessControl> Controller<P> {
    /// Creates an idle controller; nothing runs until [`Controller::start`].
    pub fn new(control: P, strategy: Strategy) -> Self {
        Self {
            control: Arc::new(control),
            strategy,
            state: Mutex::new(State {
                process: None,
                timer: None,
                inhibited: false,
            }),
        }
    }

    /// Strategy this controller was created with.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The process control in use.
    pub fn control(&self) -> &P {
        &self.control
    }

    /// Starts the locker if it is not running.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_running(&mut state)
    }

    /// `true` while some application holds an inhibition.
    pub async fn suppress(&self, inhibited: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        match self.strategy {
            Strategy::Toggle if inhibited => self.stop_process(&mut state).await?,
            Strategy::Toggle => self.ensure_running(&mut state)?,
            Strategy::Disrupt { interval } if inhibited => {
                if state.timer.is_none() {
                    info!(interval_secs = interval.as_secs(), "arming lock disruption timer");
                    let control = Arc::clone(&self.control);
                    state.timer = Some(tokio::spawn(disrupt(control, interval)));
                }
            }
            Strategy::Disrupt { .. } => {
                if let Some(timer) = state.timer.take() {
                    info!("cancelling lock disruption timer");
                    timer.abort();
                }
            }
        }
        state.inhibited = inhibited;
        Ok(())
    }

    /// Cancels the timer and stops the locker.
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.inhibited = false;
        self.stop_process(&mut state).await
    }

    /// Current state, taken under the controller lock.
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        Snapshot {
            process_running: state.process.is_some(),
            disruption_armed: state.timer.is_some(),
            inhibited: state.inhibited,
        }
    }

    fn ensure_running(&self, state: &mut State<P::Handle>) -> Result<()> {
        if state.process.is_none() {
            info!("starting screen lock process");
            state.process = Some(self.control.start()?);
        }
        Ok(())
    }

    /// The handle stays in `state` until the process has been reaped, so a
    /// cancelled stop is retried by the next one.
    async fn stop_process(&self, state: &mut State<P::Handle>) -> Result<()> {
        let Some(handle) = state.process.as_mut() else {
            return Ok(());
        };
        info!("terminating screen lock process");
        self.control.terminate(handle)?;
        self.control.wait(handle).await?;
        state.process = None;
        Ok(())
    }
}

async fn disrupt<P: ProcessControl>(control: Arc<P>, period: Duration) {
    let mut ticks = time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        info!("inhibition still held, deactivating screen lock");
        control.deactivate().await;
    }
}

impl<P: ProcessControl> Drop for Controller<P> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            warn!("controller dropped with an armed disruption timer");
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Event {
        Start(usize),
        Terminate(usize),
        Wait(usize),
    }

    #[derive(Default)]
    struct Fake {
        next: AtomicUsize,
        events: StdMutex<Vec<Event>>,
        deactivations: AtomicUsize,
    }

    impl Fake {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ProcessControl for Fake {
        type Handle = usize;

        fn start(&self) -> Result<usize> {
            let id = self.next.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push(Event::Start(id));
            Ok(id)
        }

        fn terminate(&self, handle: &mut usize) -> Result<()> {
            self.events.lock().unwrap().push(Event::Terminate(*handle));
            Ok(())
        }

        async fn wait(&self, handle: &mut usize) -> Result<()> {
            tokio::task::yield_now().await;
            self.events.lock().unwrap().push(Event::Wait(*handle));
            Ok(())
        }

        async fn deactivate(&self) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn toggle_stops_and_restarts_the_locker() {
        let controller = Controller::new(Fake::default(), Strategy::Toggle);
        controller.start().await.unwrap();
        controller.suppress(true).await.unwrap();
        assert!(!controller.snapshot().await.process_running);
        controller.suppress(false).await.unwrap();
        assert!(controller.snapshot().await.process_running);

        assert_eq!(
            controller.control().events(),
            vec![Event::Start(0), Event::Terminate(0), Event::Wait(0), Event::Start(1)]
        );
    }

    #[tokio::test]
    async fn repeated_suppress_is_idempotent() {
        let controller = Controller::new(Fake::default(), Strategy::Toggle);
        controller.start().await.unwrap();
        controller.suppress(true).await.unwrap();
        controller.suppress(true).await.unwrap();
        controller.suppress(false).await.unwrap();
        controller.suppress(false).await.unwrap();

        assert_eq!(controller.control().events().len(), 4);
        let snapshot = controller.snapshot().await;
        assert!(snapshot.process_running);
        assert!(!snapshot.inhibited);
    }

    #[tokio::test]
    async fn shutdown_waits_for_the_locker() {
        let controller = Controller::new(Fake::default(), Strategy::Toggle);
        controller.start().await.unwrap();
        controller.shutdown().await.unwrap();
        assert_eq!(
            controller.control().events(),
            vec![Event::Start(0), Event::Terminate(0), Event::Wait(0)]
        );
        assert_eq!(controller.snapshot().await, Snapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn disrupt_fires_while_inhibited() {
        let interval = Duration::from_secs(540);
        let controller = Controller::new(Fake::default(), Strategy::Disrupt { interval });
        controller.start().await.unwrap();
        controller.suppress(true).await.unwrap();
        assert!(controller.snapshot().await.disruption_armed);

        time::sleep(Duration::from_secs(539)).await;
        assert_eq!(controller.control().deactivations.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(controller.control().deactivations.load(Ordering::SeqCst), 1);
        time::sleep(interval).await;
        assert_eq!(controller.control().deactivations.load(Ordering::SeqCst), 2);

        controller.suppress(false).await.unwrap();
        time::sleep(interval * 3).await;
        assert_eq!(controller.control().deactivations.load(Ordering::SeqCst), 2);
        // The locker itself keeps running throughout.
        assert_eq!(controller.control().events(), vec![Event::Start(0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_does_not_stack_timers() {
        let interval = Duration::from_secs(10);
        let controller = Controller::new(Fake::default(), Strategy::Disrupt { interval });
        controller.suppress(true).await.unwrap();
        controller.suppress(true).await.unwrap();
        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(controller.control().deactivations.load(Ordering::SeqCst), 1);

        controller.shutdown().await.unwrap();
        assert!(!controller.snapshot().await.disruption_armed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn interleaved_suppress_calls_converge() {
        let controller = Arc::new(Controller::new(Fake::default(), Strategy::Toggle));
        controller.start().await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let controller = Arc::clone(&controller);
            tasks.push(tokio::spawn(async move {
                controller.suppress(i % 2 == 0).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.process_running, !snapshot.inhibited);

        // Every started process was terminated and reaped exactly once,
        // except the one still running.
        let events = controller.control().events();
        let started = events.iter().filter(|e| matches!(e, Event::Start(_))).count();
        let waited = events.iter().filter(|e| matches!(e, Event::Wait(_))).count();
        assert_eq!(started - waited, usize::from(snapshot.process_running));
    }

    #[tokio::test(start_paused = true)]
    async fn interleaved_disrupt_calls_leave_at_most_one_timer() {
        let interval = Duration::from_secs(540);
        let controller = Arc::new(Controller::new(Fake::default(), Strategy::Disrupt { interval }));
        controller.start().await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let controller = Arc::clone(&controller);
            tasks.push(tokio::spawn(async move {
                for _ in 0..i % 3 {
                    tokio::task::yield_now().await;
                }
                controller.suppress(i % 2 == 0).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.disruption_armed, snapshot.inhibited);

        let before = controller.control().deactivations.load(Ordering::SeqCst);
        time::sleep(interval + Duration::from_secs(1)).await;
        let fired = controller.control().deactivations.load(Ordering::SeqCst) - before;
        assert_eq!(fired, usize::from(snapshot.disruption_armed));

        controller.shutdown().await.unwrap();
        time::sleep(interval * 2).await;
        assert_eq!(controller.control().deactivations.load(Ordering::SeqCst), before + fired);
    }

    #[tokio::test]
    async fn cancelled_stop_is_finished_by_shutdown() {
        let controller = Arc::new(Controller::new(Fake::default(), Strategy::Toggle));
        controller.start().await.unwrap();

        // Dropped at the yield inside `wait`, before the process is reaped.
        let mut stop = Box::pin(controller.suppress(true));
        assert!(futures_util::poll!(stop.as_mut()).is_pending());
        drop(stop);
        assert!(controller.snapshot().await.process_running);

        controller.shutdown().await.unwrap();
        assert_eq!(
            controller.control().events(),
            vec![Event::Start(0), Event::Terminate(0), Event::Terminate(0), Event::Wait(0)]
        );
        assert!(!controller.snapshot().await.process_running);
    }
}
