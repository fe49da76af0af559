//! Top-level run loop: one watcher task per subscription, one controller.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::controller::{Controller, ProcessControl};
use crate::feed::Subscribe;
use crate::policy::{Engine, Policy};
use crate::watcher::watch;
use crate::{Error, Result};

type Outcome = (String, Result<()>);

/// Runs until every feed has ended, one of them fails, or `shutdown`
/// resolves. The locker is stopped on every exit path once it was started.
pub async fn run<S, P, F>(
    controller: Arc<Controller<P>>,
    policy: Arc<Policy>,
    subscriptions: Vec<S>,
    shutdown: F,
) -> Result<()>
where
    S: Subscribe,
    P: ProcessControl,
    F: Future<Output = ()>,
{
    controller.start().await?;

    let engine = Engine::new(policy, Arc::clone(&controller));
    let mut workers = JoinSet::new();
    for subscription in subscriptions {
        let engine = engine.clone();
        workers.spawn(async move {
            let label = subscription.label();
            let work = async {
                let feed = subscription.subscribe().await?;
                watch(&label, feed, engine).await
            };
            let result = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let panic = panic_message(&*payload);
                    error!(feed = label.as_str(), panic, "watcher panicked");
                    Err(Error::WatcherPanicked(label.clone()))
                }
            };
            (label, result)
        });
    }

    let outcome = tokio::select! {
        result = drain(&mut workers) => result,
        () = shutdown => {
            info!("shutdown requested");
            Ok(())
        }
    };

    workers.shutdown().await;
    let cleanup = controller.shutdown().await;
    if let Err(err) = &cleanup {
        error!(error = %err, "failed to stop screen lock process");
    }
    outcome.and(cleanup)
}

/// Installs the interrupt and terminate handlers right away and returns a
/// future resolving on the first of them. Call it before [`run`] so a signal
/// arriving while the locker starts is not fatal.
#[cfg(unix)]
pub fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("interrupt received"),
            _ = terminate.recv() => info!("SIGTERM received"),
        }
    })
}

#[cfg(windows)]
pub fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    let mut interrupt = tokio::signal::windows::ctrl_c()?;
    Ok(async move {
        interrupt.recv().await;
        info!("interrupt received");
    })
}

async fn drain(workers: &mut JoinSet<Outcome>) -> Result<()> {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((label, Err(err))) => {
                error!(feed = label.as_str(), error = %err, "watcher failed");
                return Err(err);
            }
            Err(err) => warn!(error = %err, "watcher task did not complete"),
        }
    }
    info!("all feeds ended");
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
