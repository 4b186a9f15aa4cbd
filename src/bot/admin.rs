//! Order review from inside Telegram for the ids in `ADMIN_IDS`.

use super::callback::Callback;
use super::{send, texts, user_id, AdminCommand, BotContext, HandlerResult, ShopDialogue, State};
use crate::notify::order_review_keyboard;
use crate::store::messages::add_order_manager_message;
use crate::store::orders::{self, OrderFilter};
use crate::store::types::OrderStatus;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::*;

const PENDING_LIMIT: i64 = 10;

/// Accepts `1042` as well as `#1042`.
pub fn parse_order_id(arg: &str) -> Option<i64> {
	arg.trim().trim_start_matches('#').parse().ok()
}

/// The status an admin button asks for; approving a first plan request confirms the plan.
pub fn requested_status(cb: Callback, current: OrderStatus) -> Option<OrderStatus> {
	match cb {
		Callback::AdminApprove(_) if current == OrderStatus::PendingPlan => {
			Some(OrderStatus::PlanConfirmed)
		}
		Callback::AdminApprove(_) => Some(OrderStatus::Approved),
		Callback::AdminReject(_) => Some(OrderStatus::Rejected),
		Callback::AdminDelivered(_) => Some(OrderStatus::Delivered),
		_ => None,
	}
}

pub async fn on_command(
	bot: Bot,
	msg: Message,
	cmd: AdminCommand,
	dialogue: ShopDialogue,
	ctx: Arc<BotContext>,
) -> HandlerResult {
	dialogue.reset().await?;
	let chat = msg.chat.id;
	let mut conn = ctx.pool.acquire().await?;
	match cmd {
		AdminCommand::Admin => {
			let count = |status| OrderFilter {
				status: Some(status),
				..OrderFilter::default()
			};
			let pending = orders::count_orders(&mut conn, &count(OrderStatus::PendingConfirm)).await?;
			let plans = orders::count_orders(&mut conn, &count(OrderStatus::PendingPlan)).await?;
			drop(conn);
			send(
				&bot,
				chat,
				format!(
					"🛠️ <b>Admin</b>\nPayments to review: <b>{}</b>\nFirst plan requests: <b>{}</b>\n\n\
					/pending - the latest payments to review\n\
					/search &lt;id&gt; - show one order",
					pending, plans
				),
				None,
			)
			.await
		}
		AdminCommand::Pending => {
			let pending = orders::pending_confirm(&mut conn, PENDING_LIMIT).await?;
			drop(conn);
			if pending.is_empty() {
				return send(&bot, chat, "No payments are waiting for review.", None).await;
			}
			for order in &pending {
				send(
					&bot,
					chat,
					texts::admin_order_summary(order, ctx.currency()),
					Some(order_review_keyboard(order.id).into()),
				)
				.await?;
			}
			Ok(())
		}
		AdminCommand::Search(arg) => {
			let Some(order_id) = parse_order_id(&arg) else {
				return send(&bot, chat, "Usage: /search &lt;order id&gt;", None).await;
			};
			let order = orders::get_order(&mut conn, order_id).await?;
			drop(conn);
			match order {
				Some(order) => {
					send(
						&bot,
						chat,
						texts::admin_order_summary(&order, ctx.currency()),
						Some(order_review_keyboard(order.id).into()),
					)
					.await
				}
				None => send(&bot, chat, format!("Order #{} was not found.", order_id), None).await,
			}
		}
	}
}

pub async fn on_callback(
	bot: &Bot,
	ctx: &BotContext,
	q: &CallbackQuery,
	dialogue: &ShopDialogue,
	cb: Callback,
) -> HandlerResult {
	let order_id = match cb {
		Callback::AdminApprove(id)
		| Callback::AdminReject(id)
		| Callback::AdminDelivered(id)
		| Callback::AdminMessage(id) => id,
		_ => return Ok(()),
	};
	let admin_chat = ChatId(user_id(&q.from));
	let mut conn = ctx.pool.acquire().await?;
	let Some(order) = orders::get_order(&mut conn, order_id).await? else {
		bot.answer_callback_query(q.id.clone())
			.text("Order not found.")
			.show_alert(true)
			.await?;
		return Ok(());
	};

	if cb == Callback::AdminMessage(order_id) {
		drop(conn);
		dialogue.update(State::AdminMessage { order_id }).await?;
		bot.answer_callback_query(q.id.clone()).await?;
		return send(
			bot,
			admin_chat,
			format!("✉️ Send the message for the customer of order #{}.", order_id),
			None,
		)
		.await;
	}

	let Some(requested) = requested_status(cb, order.status) else {
		return Ok(());
	};
	let change = match orders::admin_set_status(&mut conn, order_id, requested).await {
		Ok(change) => change,
		Err(e) if e.is_user_facing() => {
			bot.answer_callback_query(q.id.clone())
				.text(e.to_string())
				.show_alert(true)
				.await?;
			return Ok(());
		}
		Err(e) => return Err(e.into()),
	};
	drop(conn);
	if !change.changed {
		bot.answer_callback_query(q.id.clone())
			.text(format!("Order #{} is already {}.", order_id, change.order.status.label()))
			.await?;
		return Ok(());
	}
	info!(
		"Admin {} moved order #{} from {} to {}",
		q.from.id.0, order_id, change.previous, change.order.status
	);
	bot.answer_callback_query(q.id.clone())
		.text(format!("Order #{}: {}", order_id, change.order.status.label()))
		.await?;
	let text = texts::status_update(
		&change.order,
		change.refunded,
		change.plan_approved,
		&ctx.settings.shop,
	);
	let reached = ctx.notifier.notify_user(change.order.user_id, &text).await.is_ok();
	let mut report = format!(
		"Order #{} is now «{}».",
		order_id,
		change.order.status.label()
	);
	if !reached {
		report.push_str("\n⚠️ The customer could not be notified.");
	}
	send(bot, admin_chat, report, None).await
}

pub async fn on_message_text(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	admin: i64,
	order_id: i64,
) -> HandlerResult {
	let chat = msg.chat.id;
	if !ctx.is_admin(admin) {
		dialogue.reset().await?;
		return Ok(());
	}
	let Some(text) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
		return send(bot, chat, "Please send the message as text.", None).await;
	};
	let mut conn = ctx.pool.acquire().await?;
	let order = orders::require_order(&mut conn, order_id).await?;
	add_order_manager_message(&mut conn, order.id, order.user_id, text).await?;
	drop(conn);
	dialogue.reset().await?;
	let delivered = ctx
		.notifier
		.notify_user(order.user_id, &texts::manager_message(Some(order.id), text))
		.await;
	let reply = match delivered {
		Ok(()) => format!("✅ Sent to the customer of order #{}.", order.id),
		Err(e) => {
			warn!("Manager message for order #{} was not delivered: {}", order.id, e);
			format!(
				"Saved on order #{}, but the customer could not be reached.",
				order.id
			)
		}
	};
	send(bot, chat, reply, None).await
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn order_ids_may_carry_a_hash() {
		assert_eq!(parse_order_id("#1042"), Some(1042));
		assert_eq!(parse_order_id(" 7 "), Some(7));
		assert_eq!(parse_order_id("seven"), None);
	}

	#[test]
	fn approving_a_plan_request_confirms_the_plan() {
		assert_eq!(
			requested_status(Callback::AdminApprove(1), OrderStatus::PendingPlan),
			Some(OrderStatus::PlanConfirmed)
		);
		assert_eq!(
			requested_status(Callback::AdminApprove(1), OrderStatus::PendingConfirm),
			Some(OrderStatus::Approved)
		);
		assert_eq!(
			requested_status(Callback::AdminReject(1), OrderStatus::PendingPlan),
			Some(OrderStatus::Rejected)
		);
		assert_eq!(
			requested_status(Callback::AdminMessage(1), OrderStatus::PendingPlan),
			None
		);
	}
}
