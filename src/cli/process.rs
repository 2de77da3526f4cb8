use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use sysinfo::{get_current_pid, Signal, System};

/// The daemon binary ships next to the CLI binary.
pub fn daemon_executable() -> Result<PathBuf> {
    let cli = env::current_exe().context("can't resolve the current executable")?;
    let dir = cli
        .parent()
        .context("executable has no parent directory")?;
    let name = if cfg!(windows) {
        "focuslog-daemon.exe"
    } else {
        "focuslog-daemon"
    };
    Ok(dir.join(name))
}

pub fn kill_running_daemons(name: &Path) {
    let system = System::new_all();
    let current_id = get_current_pid().unwrap();
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
        }
    }
}

/// Shuts down any previous daemon and starts a fresh one. The daemon
/// detaches itself once spawned, so this returns as soon as the handoff is
/// done.
pub fn restart_daemon(dir: Option<&Path>) -> Result<()> {
    let daemon = daemon_executable()?;
    kill_running_daemons(&daemon);

    let mut command = std::process::Command::new(&daemon);
    if let Some(dir) = dir {
        command.arg("--dir").arg(dir);
    }

    println!("Spawning {}", daemon.display());
    #[allow(clippy::zombie_processes)]
    let _ = command.spawn()?;
    println!("Success");
    Ok(())
}
