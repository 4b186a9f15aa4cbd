use super::{keyboards, refuse, send, texts, BotContext, HandlerResult, ShopDialogue, State};
use crate::notify::html_escape;
use crate::store::orders::{count_by_category, list_by_category, HistoryCategory};
use crate::store::types::now;
use crate::store::{coupons, users};
use teloxide::prelude::*;
use tracing::*;

pub const HISTORY_PAGE_SIZE: i64 = 10;

/// Whether another page follows `page` when there are `total` orders.
pub fn next_page(page: u32, total: i64) -> Option<u32> {
	let shown = (i64::from(page) + 1) * HISTORY_PAGE_SIZE;
	(shown < total).then_some(page + 1)
}

pub async fn show(bot: &Bot, ctx: &BotContext, chat: ChatId, user: i64) -> HandlerResult {
	let mut conn = ctx.pool.acquire().await?;
	let stats = users::user_stats(&mut conn, user).await?;
	drop(conn);
	send(
		bot,
		chat,
		texts::profile(&stats, ctx.currency()),
		Some(keyboards::profile_actions().into()),
	)
	.await
}

pub async fn ask_coupon(bot: &Bot, dialogue: &ShopDialogue, chat: ChatId) -> HandlerResult {
	dialogue.update(State::CouponCode).await?;
	send(
		bot,
		chat,
		"🎟️ Send your coupon code.",
		Some(keyboards::coupon_cancel().into()),
	)
	.await
}

pub async fn on_coupon_code(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	user: i64,
) -> HandlerResult {
	let chat = msg.chat.id;
	let Some(code) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
		return send(bot, chat, "Please send the coupon code as text.", None).await;
	};
	let mut conn = ctx.pool.acquire().await?;
	let redeemed = coupons::redeem(&mut conn, user, code, now()).await;
	drop(conn);
	match redeemed {
		Ok(redemption) => {
			dialogue.reset().await?;
			info!(
				"User {} redeemed coupon {} for {}",
				user, redemption.code, redemption.amount
			);
			send(
				bot,
				chat,
				format!(
					"🎉 Coupon <b>{}</b> added {} to your wallet.\nNew balance: <b>{}</b>",
					html_escape(&redemption.code),
					texts::money(redemption.amount, ctx.currency()),
					texts::money(redemption.balance, ctx.currency())
				),
				Some(keyboards::main_menu().into()),
			)
			.await
		}
		Err(e) => refuse(bot, ctx, chat, e).await,
	}
}

pub async fn history_menu(bot: &Bot, chat: ChatId) -> HandlerResult {
	send(
		bot,
		chat,
		"📜 <b>Order history</b>\nWhich orders do you want to see?",
		Some(keyboards::history_menu().into()),
	)
	.await
}

pub async fn history_page(
	bot: &Bot,
	ctx: &BotContext,
	chat: ChatId,
	user: i64,
	category: HistoryCategory,
	page: u32,
) -> HandlerResult {
	let mut conn = ctx.pool.acquire().await?;
	let total = count_by_category(&mut conn, user, category).await?;
	let orders = list_by_category(
		&mut conn,
		user,
		category,
		HISTORY_PAGE_SIZE,
		i64::from(page) * HISTORY_PAGE_SIZE,
	)
	.await?;
	drop(conn);
	if orders.is_empty() {
		return send(
			bot,
			chat,
			"There are no orders here yet.",
			Some(keyboards::history_more(category, None).into()),
		)
		.await;
	}
	let text = orders
		.iter()
		.map(|order| texts::order_card(order, ctx.currency()))
		.collect::<Vec<_>>()
		.join("\n\n");
	send(
		bot,
		chat,
		text,
		Some(keyboards::history_more(category, next_page(page, total)).into()),
	)
	.await
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pages_hold_ten_orders() {
		assert_eq!(next_page(0, 10), None);
		assert_eq!(next_page(0, 11), Some(1));
		assert_eq!(next_page(1, 25), Some(2));
		assert_eq!(next_page(2, 25), None);
		assert_eq!(next_page(0, 0), None);
	}
}
