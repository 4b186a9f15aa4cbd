use crate::notify::{DisabledNotifier, Notifier, TelegramNotifier};
use crate::system::{System, SystemTask};
use crate::web::auth::AdminCredentials;
use crate::web::{runner, Panel, WebConfig};
use std::sync::Arc;
use teloxide::Bot;
use tokio::task::JoinHandle;
use tracing::*;

/// Serves the admin panel until quit.
pub struct WebAdmin;

impl SystemTask for WebAdmin {
	fn spawn(&self, system: &System) -> anyhow::Result<Option<JoinHandle<()>>> {
		let settings = system.settings.clone();
		let config = WebConfig::from_settings(&settings.admin_web);
		let credentials = AdminCredentials::new(&settings.admin_web.user, &settings.admin_web.pass)?;
		let notifier: Arc<dyn Notifier> = match settings.bot.token.as_deref() {
			Some(token) => Arc::new(TelegramNotifier::new(
				Bot::new(token),
				settings.bot.admin_ids.clone(),
			)),
			None => {
				warn!("BOT_TOKEN is not set, the admin panel will not be able to message customers");
				Arc::new(DisabledNotifier)
			}
		};
		let panel = Panel { settings, notifier };
		let db_pool = system.db_pool.clone();
		let quit = system.quit.clone();

		let handle = tokio::spawn(async move {
			if let Err(e) = runner(config, db_pool, panel, credentials, quit).await {
				error!("Admin web panel failed: {}", e);
			}
		});
		Ok(Some(handle))
	}
}
