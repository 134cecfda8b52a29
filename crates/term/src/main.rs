mod cli;
mod display;
mod shutdown;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;

use scriv_editor::config::Env;
use scriv_editor::exec::{OsSignals, spawn_wait_actor};
use scriv_editor::fid::spawn_fid_allocator;
use scriv_editor::keyboard::spawn_key_actor;
use scriv_editor::newwindow::spawn_window_actor;
use scriv_editor::pointer::spawn_pointer_actor;
use scriv_editor::sel::mem::MemSelectionService;
use scriv_editor::sel::{ExportState, Exporter, FsSelectionService, SelectionService, spawn_import_actor};
use scriv_editor::state::{CELL_W, EditorState, LINE_H, Rect};
use scriv_worker::{Mailbox, MailboxPolicy, MailboxSender, TaskClass};

use cli::Cli;
use display::TermDisplay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	init_tracing()?;
	let env = Env::load();
	tracing::debug!(tab_width = env.tab_width, port = ?cli.port, "scriv.start");

	let (w, h) = cli
		.geometry
		.or_else(|| terminal_size().map(|(c, r)| (c * CELL_W, r * LINE_H)))
		.unwrap_or((800, 600));
	let rect = Rect { x: 0, y: 0, w, h };
	let shared = EditorState::new(rect, cli.columns).into_shared();

	let display = Arc::new(TermDisplay::stdout(rect));
	let (redraw, warn) = scriv_editor::redraw::spawn(Arc::clone(&shared), display.clone());

	let exec = spawn_wait_actor(
		Arc::clone(&shared),
		warn.clone(),
		redraw.clone(),
		Arc::new(OsSignals),
		None,
	);

	let mount = cli.mount.as_ref().or(env.mount.as_ref());
	let service: Arc<dyn SelectionService> = match mount {
		Some(root) => Arc::new(FsSelectionService::new(root)),
		None => Arc::new(MemSelectionService::new()),
	};
	let export_state = Arc::new(parking_lot::Mutex::new(ExportState::default()));
	let changes = Mailbox::new(64, MailboxPolicy::Backpressure);
	let exporter = Exporter::new(service, Arc::clone(&export_state), changes.sender(), warn.clone());

	let pointer = spawn_pointer_actor(
		Arc::clone(&shared),
		display.clone(),
		warn.clone(),
		redraw.clone(),
		exec.clone(),
		exporter,
	);
	spawn_import_actor(
		Arc::clone(&shared),
		export_state,
		changes.receiver(),
		pointer.sel_repaint.clone(),
	);

	let keys = spawn_key_actor(Arc::clone(&shared), redraw.clone());
	let creator = spawn_window_actor(Arc::clone(&shared), redraw.clone());
	// Serves protocol handles once a file server attaches.
	let _fid_pool = spawn_fid_allocator();

	shutdown::ignore_benign_signals()?;
	spawn_resize_watcher(display.clone(), pointer.resize.clone())?;
	spawn_stdin_pump(keys);

	if let Some(path) = &cli.load {
		let dump = tokio::fs::read_to_string(path)
			.await
			.with_context(|| format!("reading snapshot {}", path.display()))?;
		if let Some(id) = creator.create("+dump", 0).await {
			let mut state = shared.lock();
			if let Some(win) = state.window_mut(id) {
				win.body.insert(0, &dump);
				win.body.commit();
			}
		}
	}

	for (i, path) in cli.files.iter().enumerate() {
		let column = i % cli.columns;
		let name = path.display().to_string();
		let Some(id) = creator.create(&name, column).await else {
			break;
		};
		match tokio::fs::read_to_string(path).await {
			Ok(content) => {
				let mut state = shared.lock();
				if let Some(win) = state.window_mut(id) {
					win.body.insert(0, &content);
					win.body.commit();
				}
			}
			Err(err) => warn.post(format!("{name}: {err}")).await,
		}
	}
	if cli.files.is_empty() && cli.load.is_none() && !cli.start_empty {
		creator.create("scratch", 0).await;
	}
	redraw.request().await;

	let class = shutdown::wait_for_termination().await?;
	shutdown::run(&shared, &exec, class, &env.home).await;
	Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
	Ok(())
}

/// Turns SIGWINCH into resize pings for the pointer actor, refreshing the
/// display geometry first so the re-query sees the new size.
fn spawn_resize_watcher(display: Arc<TermDisplay>, resize: MailboxSender<()>) -> anyhow::Result<()> {
	use tokio::signal::unix::{SignalKind, signal};

	let mut winch = signal(SignalKind::window_change()).context("registering SIGWINCH handler")?;
	scriv_worker::spawn(TaskClass::Background, async move {
		while winch.recv().await.is_some() {
			if let Some((cols, rows)) = terminal_size() {
				display.set_geometry(Rect {
					x: 0,
					y: 0,
					w: cols * CELL_W,
					h: rows * LINE_H,
				});
			}
			if resize.try_send(()).await.is_err() {
				break;
			}
		}
	});
	Ok(())
}

/// Terminal size in cells, `None` when stdout is not a tty.
fn terminal_size() -> Option<(i32, i32)> {
	let mut ws = libc::winsize {
		ws_row: 0,
		ws_col: 0,
		ws_xpixel: 0,
		ws_ypixel: 0,
	};
	// SAFETY: TIOCGWINSZ only writes the winsize out-parameter.
	let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
	if rc != 0 || ws.ws_col == 0 || ws.ws_row == 0 {
		return None;
	}
	Some((i32::from(ws.ws_col), i32::from(ws.ws_row)))
}

/// Feeds stdin to the key actor, decoding UTF-8 across read boundaries.
fn spawn_stdin_pump(keys: MailboxSender<char>) {
	scriv_worker::spawn(TaskClass::IoBlocking, async move {
		let mut stdin = tokio::io::stdin();
		let mut pending: Vec<u8> = Vec::new();
		let mut buf = [0u8; 1024];
		loop {
			let n = match stdin.read(&mut buf).await {
				Ok(0) | Err(_) => break,
				Ok(n) => n,
			};
			pending.extend_from_slice(&buf[..n]);
			loop {
				match std::str::from_utf8(&pending) {
					Ok(s) => {
						for ch in s.chars() {
							if keys.send(ch).await.is_err() {
								return;
							}
						}
						pending.clear();
						break;
					}
					Err(err) => {
						let valid = err.valid_up_to();
						let head = String::from_utf8_lossy(&pending[..valid]).into_owned();
						for ch in head.chars() {
							if keys.send(ch).await.is_err() {
								return;
							}
						}
						if err.error_len().is_some() {
							// Drop the malformed byte and keep going.
							pending.drain(..=valid);
						} else {
							// Incomplete sequence; wait for the rest.
							pending.drain(..valid);
							break;
						}
					}
				}
			}
		}
		tracing::debug!("stdin.pump.exit");
	});
}
