use crate::bot::texts;
use crate::config::ShopSettings;
use crate::database::DbPool;
use crate::notify::{Notifier, TelegramNotifier};
use crate::store::orders::expire_and_refund;
use crate::system::{System, SystemTask};
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::*;

/// Expires unpaid cart orders and returns their wallet reservations.
pub struct OrderExpiry {
	pub period: Duration,
}

impl Default for OrderExpiry {
	fn default() -> Self {
		Self {
			period: Duration::from_secs(30),
		}
	}
}

/// One pass: expires what is due and tells each customer, returns how many orders expired.
pub async fn sweep(
	pool: &DbPool,
	notifier: &dyn Notifier,
	shop: &ShopSettings,
	at: OffsetDateTime,
) -> anyhow::Result<usize> {
	let mut conn = pool.acquire().await?;
	let expired = expire_and_refund(&mut conn, at).await?;
	drop(conn);
	for entry in &expired {
		let text = texts::order_expired(
			entry.order.id,
			shop.payment_timeout_min,
			entry.refunded,
			&shop.currency,
		);
		if let Err(e) = notifier.notify_user(entry.order.user_id, &text).await {
			debug!("Expiry notice for order #{} was not delivered: {}", entry.order.id, e);
		}
	}
	Ok(expired.len())
}

impl SystemTask for OrderExpiry {
	fn spawn(&self, system: &System) -> anyhow::Result<Option<JoinHandle<()>>> {
		let token = system.settings.bot.require_token()?.to_owned();
		let notifier = TelegramNotifier::new(Bot::new(token), system.settings.bot.admin_ids.clone());
		let notifier: Arc<dyn Notifier> = Arc::new(notifier);
		let pool = system.db_pool.clone();
		let settings = system.settings.clone();
		let period = self.period;
		let mut on_quit = system.quit.subscribe();
		let handle = tokio::spawn(async move {
			info!("Order expiry task has launched, sweeping every {:?}", period);
			let mut interval = tokio::time::interval(period);
			loop {
				tokio::select! {
					_ = interval.tick() => {
						let at = crate::store::types::now();
						if let Err(e) = sweep(&pool, notifier.as_ref(), &settings.shop, at).await {
							error!("Order expiry sweep failed: {:?}", e);
						}
					}
					_ = on_quit.recv() => {
						info!("Order expiry task has received a quit request, exiting");
						break;
					}
				}
			}
		});
		Ok(Some(handle))
	}
}
