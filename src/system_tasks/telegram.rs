use crate::bot::{register_commands, schema, BotContext, State};
use crate::notify::TelegramNotifier;
use crate::system::{System, SystemTask};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use tokio::task::JoinHandle;
use tracing::*;

/// Long polls Telegram and runs the shop dialogue until quit.
pub struct TelegramBot;

impl SystemTask for TelegramBot {
	fn spawn(&self, system: &System) -> anyhow::Result<Option<JoinHandle<()>>> {
		let token = system.settings.bot.require_token()?.to_owned();
		let bot = Bot::new(token);
		let notifier = TelegramNotifier::new(bot.clone(), system.settings.bot.admin_ids.clone());
		let ctx = Arc::new(BotContext::new(
			system.db_pool.clone(),
			system.settings.clone(),
			Arc::new(notifier),
		));
		let do_quit = system.quit.clone();
		let mut on_quit = system.quit.subscribe();

		let handle = tokio::spawn(async move {
			if let Err(e) = register_commands(&bot).await {
				warn!("Unable to register the bot commands: {}", e);
			}
			let mut dispatcher = Dispatcher::builder(bot, schema())
				.dependencies(dptree::deps![InMemStorage::<State>::new(), ctx])
				.error_handler(LoggingErrorHandler::with_custom_text(
					"An error has occurred in the dispatcher",
				))
				.build();

			let shutdown = dispatcher.shutdown_token();
			tokio::spawn(async move {
				let _ = on_quit.recv().await;
				info!("Shutdown requested, stopping the telegram dispatcher");
				// The token refuses while the dispatcher is still starting up
				for _ in 0..100 {
					match shutdown.shutdown() {
						Ok(done) => {
							done.await;
							break;
						}
						Err(_idle) => tokio::time::sleep(Duration::from_millis(100)).await,
					}
				}
			});

			info!("Telegram bot is polling for updates");
			dispatcher.dispatch().await;
			info!("Telegram bot has stopped");
			let _ = do_quit.send(());
		});
		Ok(Some(handle))
	}
}
