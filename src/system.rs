use crate::config::{load_env_file, Settings};
use crate::database::{DatabaseConfig, DbPool};
use crate::logger::init_logging;
use crate::store::catalog::seed_default_catalog;
use crate::store::migrate_all;
use crate::system_tasks::daemon::Daemon;
use crate::system_tasks::order_expiry::OrderExpiry;
use crate::system_tasks::telegram::TelegramBot;
use crate::system_tasks::web_admin::WebAdmin;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::*;

#[derive(StructOpt, Debug, Default)]
#[structopt()]
pub struct SystemArgs {
	/// Environment file to load instead of the `.env` found from the working directory
	#[structopt(long, parse(from_os_str))]
	pub env_file: Option<PathBuf>,
	/// log4rs RON configuration, overrides `LOG_CONFIG`
	#[structopt(long, parse(from_os_str))]
	pub log_config: Option<PathBuf>,
}

/// Which of the two processes is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
	Bot,
	AdminWeb,
}

impl Role {
	fn tasks(self) -> Vec<Box<dyn SystemTask>> {
		match self {
			Role::Bot => vec![
				Box::new(Daemon),
				Box::new(TelegramBot),
				Box::new(OrderExpiry::default()),
			],
			Role::AdminWeb => vec![Box::new(Daemon), Box::new(WebAdmin)],
		}
	}
}

pub trait SystemTask {
	fn spawn(&self, system: &System) -> anyhow::Result<Option<JoinHandle<()>>>;
}

pub trait QuitOnError {
	/// Logs the error and asks every task to stop, then hands the result back.
	fn quit_on_err(self, quit: &broadcast::Sender<()>) -> Self;
}

impl<T, E: Display> QuitOnError for Result<T, E> {
	fn quit_on_err(self, quit: &broadcast::Sender<()>) -> Self {
		if let Err(e) = &self {
			error!("Quitting due to error: {}", e);
			let _ = quit.send(());
		}
		self
	}
}

pub struct System {
	pub settings: Arc<Settings>,
	pub db_pool: DbPool,
	pub quit: broadcast::Sender<()>,
	system_tasks: Vec<JoinHandle<()>>,
}

impl System {
	pub fn new(settings: Settings, db_pool: DbPool) -> Self {
		let (quit, _recv_quit) = broadcast::channel(1);
		System {
			settings: Arc::new(settings),
			db_pool,
			quit,
			system_tasks: Vec::new(),
		}
	}

	pub async fn run(role: Role) -> anyhow::Result<()> {
		Self::run_with_args(role, SystemArgs::from_args()).await
	}

	pub async fn run_with_args(role: Role, args: SystemArgs) -> anyhow::Result<()> {
		load_env_file(args.env_file.as_deref())?;
		let settings = Settings::from_env()?;
		let log_config = args.log_config.or_else(|| settings.log.config.clone());
		init_logging(log_config.as_deref(), &settings.log.file)?;
		info!("Starting the {:?} process", role);
		settings.warn_questionable();

		let db_pool = DatabaseConfig::from_settings(&settings.database)
			.create_database_pool()
			.await?;
		migrate_all(&db_pool).await?;
		if role == Role::Bot {
			let mut conn = db_pool.acquire().await?;
			seed_default_catalog(&mut conn).await?;
		}

		let mut system = System::new(settings, db_pool);
		system.startup_system(role)?;
		system.wait().await
	}

	fn startup_system(&mut self, role: Role) -> anyhow::Result<()> {
		for task in role.tasks() {
			if let Some(handle) = task.spawn(self).quit_on_err(&self.quit)? {
				self.system_tasks.push(handle);
			}
		}
		Ok(())
	}

	/// Waits until every task has stopped.
	pub async fn wait(&mut self) -> anyhow::Result<()> {
		while let Some(task) = self.system_tasks.pop() {
			task.await?;
		}
		info!("All system tasks have stopped");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn errors_broadcast_quit() {
		let (quit, mut on_quit) = broadcast::channel(1);
		let ok: Result<u8, String> = Ok(1);
		assert_eq!(ok.quit_on_err(&quit), Ok(1));
		assert!(on_quit.try_recv().is_err());

		let failed: Result<u8, String> = Err("boom".to_owned());
		assert!(failed.quit_on_err(&quit).is_err());
		assert!(on_quit.recv().await.is_ok());
	}

	#[test]
	fn arguments_are_optional() {
		let args = SystemArgs::from_iter(["bot"]);
		assert!(args.env_file.is_none());
		let args = SystemArgs::from_iter(["bot", "--env-file", "prod.env", "--log-config", "log.ron"]);
		assert_eq!(args.env_file, Some(PathBuf::from("prod.env")));
		assert_eq!(args.log_config, Some(PathBuf::from("log.ron")));
	}
}
