use crate::system::{System, SystemTask};
use tokio::task::JoinHandle;
use tracing::*;

/// Owns process signals, turning them into a quit broadcast.
pub struct Daemon;

impl SystemTask for Daemon {
	fn spawn(&self, system: &System) -> anyhow::Result<Option<JoinHandle<()>>> {
		let do_quit = system.quit.clone();
		let mut on_quit = system.quit.subscribe();

		#[cfg(unix)]
		let handle = {
			use tokio::signal::unix::{signal, SignalKind};
			let mut hangup = signal(SignalKind::hangup())?;
			let mut interrupt = signal(SignalKind::interrupt())?;
			let mut quit = signal(SignalKind::quit())?;
			let mut terminate = signal(SignalKind::terminate())?;
			tokio::task::spawn(async move {
				info!("Daemon task has launched");
				loop {
					let do_break = tokio::select! {
						_ = hangup.recv() => {
							info!("Hangup requested, daemon mode ignores it");
							false
						}
						_ = interrupt.recv() => {
							info!("Interrupt signal received, cleanly exiting...");
							let _ = do_quit.send(());
							true
						}
						_ = quit.recv() => {
							info!("Quit signal received, cleanly exiting...");
							let _ = do_quit.send(());
							true
						}
						_ = terminate.recv() => {
							info!("Terminate signal received, cleanly exiting...");
							let _ = do_quit.send(());
							true
						}
						_ = on_quit.recv() => {
							info!("Daemon task has received a quit requested, exiting");
							true
						}
					};
					if do_break {
						break;
					}
				}
			})
		};

		#[cfg(not(unix))]
		let handle = tokio::task::spawn(async move {
			info!("Daemon task has launched");
			tokio::select! {
				_ = tokio::signal::ctrl_c() => {
					info!("Ctrl+C signal received, cleanly exiting...");
					let _ = do_quit.send(());
				}
				_ = on_quit.recv() => {
					info!("Daemon task has received a quit requested, exiting");
				}
			}
		});

		Ok(Some(handle))
	}
}
