use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::Config;
use crate::controller::ProcessControl;
use crate::{Error, Result, sys};

/// Runs the locker and the deactivate action as child processes.
#[derive(Clone, Debug)]
pub struct CommandControl {
    lock: Vec<String>,
    deactivate: Vec<String>,
}

impl CommandControl {
    pub fn new(lock: Vec<String>, deactivate: Vec<String>) -> Result<Self> {
        if lock.is_empty() {
            return Err(Error::Config("lock command is empty".to_string()));
        }
        if deactivate.is_empty() {
            return Err(Error::Config("deactivate command is empty".to_string()));
        }
        Ok(Self { lock, deactivate })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.lock_command.clone(), config.deactivate_command.clone())
    }
}

pub(crate) fn command(argv: &[String]) -> Command {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]).stdin(Stdio::null());
    cmd
}

pub(crate) fn spawn(argv: &[String], cmd: &mut Command) -> Result<Child> {
    cmd.spawn().map_err(|source| Error::Spawn {
        command: argv.join(" "),
        source,
    })
}

impl ProcessControl for CommandControl {
    type Handle = Child;

    fn start(&self) -> Result<Child> {
        let child = spawn(&self.lock, &mut command(&self.lock))?;
        debug!(pid = child.id(), command = %self.lock.join(" "), "screen lock process started");
        Ok(child)
    }

    fn terminate(&self, child: &mut Child) -> Result<()> {
        sys::terminate(child)?;
        Ok(())
    }

    async fn wait(&self, child: &mut Child) -> Result<()> {
        let status = child.wait().await?;
        debug!(%status, "screen lock process exited");
        Ok(())
    }

    async fn deactivate(&self) {
        let mut cmd = command(&self.deactivate);
        cmd.stdout(Stdio::null());
        let result = match spawn(&self.deactivate, &mut cmd) {
            Ok(mut child) => child.wait().await.map_err(Error::from),
            Err(err) => Err(err),
        };
        match result {
            Ok(status) if status.success() => {}
            Ok(status) => {
                warn!(%status, command = %self.deactivate.join(" "), "deactivate command failed");
            }
            Err(err) => warn!(error = %err, "deactivate command could not run"),
        }
    }
}
