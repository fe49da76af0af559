use std::io;

use tokio::process::Child;

pub fn terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
