use std::io;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Child;

/// Sends `SIGTERM` so the locker can release its grabs before exiting.
pub fn terminate(child: &mut Child) -> io::Result<()> {
    // Already reaped.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|_| io::Error::other(format!("pid {pid} out of range")))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
}
