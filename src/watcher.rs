use tracing::{debug, info};

use crate::Result;
use crate::controller::ProcessControl;
use crate::decoder::Decoder;
use crate::feed::Feed;
use crate::policy::Engine;

/// Drains one feed in arrival order until it ends cleanly or fails.
pub async fn watch<F, P>(label: &str, mut feed: F, engine: Engine<P>) -> Result<()>
where
    F: Feed,
    P: ProcessControl,
{
    let mut decoder = Decoder::new();
    info!(feed = label, "watching for inhibit requests");
    while let Some(event) = feed.next_event().await? {
        for line in event.into_lines() {
            let Some(record) = decoder.push(line) else {
                continue;
            };
            if engine.handle(&record).await? {
                decoder.reset();
            } else {
                debug!(feed = label, ?record, "record kept until next header");
            }
        }
    }
    info!(feed = label, "feed ended");
    Ok(())
}
