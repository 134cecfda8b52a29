//! Signal handling and process shutdown.
//!
//! One coordinator task owns termination: it classifies the incoming signal
//! against a fixed table, persists a recovery snapshot of the editor state
//! under the home directory, and hangs up every child process group before
//! the process exits. Nothing else in the program reacts to signals except
//! SIGWINCH, which the front end turns into resize events.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::signal::unix::{SignalKind, signal};

use scriv_editor::exec::{ExecQueues, KillRequest};
use scriv_editor::state::Shared;

/// What a signal does to the process. The table is fixed, not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalClass {
	/// Benign transient condition, consumed without effect.
	Ignore,
	/// Clean termination: snapshot, hang up children, exit.
	Terminate,
	/// Termination with a best-effort state dump first.
	DumpThenTerminate,
}

pub fn classify(signo: i32) -> SignalClass {
	match signo {
		libc::SIGPIPE | libc::SIGCHLD | libc::SIGWINCH | libc::SIGTTIN | libc::SIGTTOU | libc::SIGURG => SignalClass::Ignore,
		libc::SIGHUP | libc::SIGINT | libc::SIGTERM => SignalClass::Terminate,
		_ => SignalClass::DumpThenTerminate,
	}
}

/// Default snapshot location.
pub fn snapshot_path(home: &Path) -> PathBuf {
	home.join(".scriv.dump")
}

/// Serializes the layout to `path` so a later `-l` can restore it.
pub fn write_snapshot(shared: &Shared, path: &Path) -> std::io::Result<()> {
	let dump = shared.lock().snapshot();
	std::fs::write(path, dump)
}

/// Swallows write-to-closed-pipe so a dying child never takes the editor
/// down with it.
pub fn ignore_benign_signals() -> anyhow::Result<()> {
	let mut pipe = signal(SignalKind::pipe()).context("registering SIGPIPE handler")?;
	scriv_worker::spawn(scriv_worker::TaskClass::Background, async move {
		while pipe.recv().await.is_some() {
			tracing::trace!("signal.pipe.ignored");
		}
	});
	Ok(())
}

/// Blocks until a terminating signal arrives and returns its class.
pub async fn wait_for_termination() -> anyhow::Result<SignalClass> {
	let mut hup = signal(SignalKind::hangup()).context("registering SIGHUP handler")?;
	let mut int = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
	let mut term = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
	let mut quit = signal(SignalKind::quit()).context("registering SIGQUIT handler")?;
	let mut usr1 = signal(SignalKind::user_defined1()).context("registering SIGUSR1 handler")?;

	let signo = tokio::select! {
		_ = hup.recv() => libc::SIGHUP,
		_ = int.recv() => libc::SIGINT,
		_ = term.recv() => libc::SIGTERM,
		_ = quit.recv() => libc::SIGQUIT,
		_ = usr1.recv() => libc::SIGUSR1,
	};
	tracing::info!(signo, "shutdown.signal");
	Ok(classify(signo))
}

/// Runs the shutdown path for `class`: snapshot, then hang up all children.
pub async fn run(shared: &Shared, exec: &ExecQueues, class: SignalClass, home: &Path) {
	if class == SignalClass::Ignore {
		return;
	}
	let path = snapshot_path(home);
	if let Err(err) = write_snapshot(shared, &path) {
		tracing::warn!(path = %path.display(), error = %err, "shutdown.snapshot_failed");
	}
	let _ = exec.kill.send(KillRequest::AllHangup).await;
	// Give the wait actor a moment to deliver the hangups.
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
