//! Paying for cart orders: by card, from the wallet, both, or on the first purchase plan.

use super::{
	keyboards, refuse, send, texts, user_id, BotContext, HandlerError, HandlerResult, Receipt,
	ShopDialogue, State,
};
use crate::notify::{html_escape, FileKind};
use crate::store::orders::{self, Order};
use crate::store::types::{now, parse_amount, OrderStatus};
use crate::store::{discounts, users, wallet, StoreError};
use teloxide::prelude::*;
use teloxide::types::User;
use tracing::*;

/// The order when it is still in the user's cart.
async fn cart_order(ctx: &BotContext, user: i64, order_id: i64) -> Result<Option<Order>, HandlerError> {
	let mut conn = ctx.pool.acquire().await?;
	let order = orders::get_order(&mut conn, order_id).await?;
	let deadline_ok = |order: &Order| {
		let at = now();
		order
			.await_deadline
			.as_deref()
			.and_then(crate::store::types::parse_timestamp)
			.map_or(true, |deadline| deadline > at)
	};
	Ok(order.filter(|o| {
		o.user_id == user && o.status == OrderStatus::AwaitingPayment && deadline_ok(o)
	}))
}

/// Payment needs a verified phone number, asks for it when missing.
async fn has_contact(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> Result<bool, HandlerError> {
	let mut conn = ctx.pool.acquire().await?;
	if users::is_contact_verified(&mut conn, user).await? {
		return Ok(true);
	}
	dialogue.update(State::WaitContact { order_id }).await?;
	send(
		bot,
		ChatId(user),
		texts::CONTACT_REQUIRED,
		Some(keyboards::request_contact().into()),
	)
	.await?;
	Ok(false)
}

/// Looks the order up for a payment action, answering when it cannot be paid.
async fn payable_order(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> Result<Option<Order>, HandlerError> {
	let Some(order) = cart_order(ctx, user, order_id).await? else {
		dialogue.reset().await?;
		send(bot, ChatId(user), texts::INVALID_ORDER, None).await?;
		return Ok(None);
	};
	if !has_contact(bot, ctx, dialogue, user, order_id).await? {
		return Ok(None);
	}
	Ok(Some(order))
}

fn comment_of(text: &str) -> String {
	if texts::is_skip_word(text) {
		String::new()
	} else {
		text.trim().to_owned()
	}
}

fn non_empty(comment: &str) -> Option<&str> {
	Some(comment).filter(|c| !c.is_empty())
}

pub async fn send_checkout(
	bot: &Bot,
	ctx: &BotContext,
	chat: ChatId,
	order: &Order,
	plan_offered: bool,
) -> HandlerResult {
	send(
		bot,
		chat,
		texts::checkout_prompt(order, ctx.currency()),
		Some(keyboards::cart_actions(order, plan_offered).into()),
	)
	.await
}

pub async fn show_cart(bot: &Bot, ctx: &BotContext, chat: ChatId, user: i64) -> HandlerResult {
	let mut conn = ctx.pool.acquire().await?;
	let at = now();
	let cart = orders::list_cart(&mut conn, user, &ctx.order_policy(), at).await?;
	if cart.is_empty() {
		return send(
			bot,
			chat,
			"🧺 Your cart is empty.",
			Some(keyboards::main_menu().into()),
		)
		.await;
	}
	let first_purchase = !orders::user_has_delivered_order(&mut conn, user).await?;
	drop(conn);
	for order in &cart {
		send(
			bot,
			chat,
			texts::cart_entry(order, ctx.currency(), at),
			Some(keyboards::cart_actions(order, order.allow_first_plan && first_purchase).into()),
		)
		.await?;
	}
	Ok(())
}

pub async fn on_contact(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	user: &User,
	order_id: Option<i64>,
) -> HandlerResult {
	let chat = msg.chat.id;
	let Some(contact) = msg.contact() else {
		return send(
			bot,
			chat,
			texts::CONTACT_REQUIRED,
			Some(keyboards::request_contact().into()),
		)
		.await;
	};
	if contact.user_id != Some(user.id) {
		return send(
			bot,
			chat,
			"Please share your own number with the button below.",
			Some(keyboards::request_contact().into()),
		)
		.await;
	}
	let id = user_id(user);
	let mut conn = ctx.pool.acquire().await?;
	users::set_contact_verified(&mut conn, id, &contact.phone_number).await?;
	drop(conn);
	dialogue.reset().await?;
	info!("User {} verified their phone number", id);
	send(
		bot,
		chat,
		"✅ Your number is verified.",
		Some(keyboards::main_menu().into()),
	)
	.await?;
	if let Some(order_id) = order_id {
		if let Some(order) = cart_order(ctx, id, order_id).await? {
			let mut conn = ctx.pool.acquire().await?;
			let plan_offered =
				order.allow_first_plan && !orders::user_has_delivered_order(&mut conn, id).await?;
			drop(conn);
			send_checkout(bot, ctx, chat, &order, plan_offered).await?;
		}
	}
	Ok(())
}

pub async fn pay_card(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> HandlerResult {
	let Some(order) = payable_order(bot, ctx, dialogue, user, order_id).await? else {
		return Ok(());
	};
	dialogue.update(State::CardReceipt { order_id }).await?;
	send(
		bot,
		ChatId(user),
		texts::card_details(&ctx.settings.shop, order_id, order.card_part()),
		None,
	)
	.await
}

pub async fn on_receipt(
	bot: &Bot,
	msg: &Message,
	dialogue: &ShopDialogue,
	order_id: i64,
) -> HandlerResult {
	let file = if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
		Some((FileKind::Photo, photo.file.id.to_string()))
	} else {
		msg.document()
			.map(|doc| (FileKind::Document, doc.file.id.to_string()))
	};
	let text = msg
		.text()
		.or_else(|| msg.caption())
		.map(str::trim)
		.filter(|t| !t.is_empty())
		.map(str::to_owned);
	if file.is_none() && text.is_none() {
		return send(
			bot,
			msg.chat.id,
			"Please send the receipt as a photo, a file or text.",
			None,
		)
		.await;
	}
	let receipt = Receipt { file, text };
	debug!(
		"Receipt for order #{} received, file {:?}",
		order_id,
		receipt.file_id()
	);
	dialogue.update(State::CardComment { order_id, receipt }).await?;
	send(
		bot,
		msg.chat.id,
		"📝 Anything our team should know about this order? Send a comment, or \"none\".",
		None,
	)
	.await
}

pub async fn on_card_comment(
	bot: &Bot,
	msg: &Message,
	dialogue: &ShopDialogue,
	order_id: i64,
	receipt: Receipt,
) -> HandlerResult {
	let Some(text) = msg.text() else {
		return send(bot, msg.chat.id, "Please send the comment as text, or \"none\".", None).await;
	};
	let comment = comment_of(text);
	let preview = texts::comment_preview("🧾 Your receipt is ready to be sent for review.", &comment);
	dialogue
		.update(State::CardConfirm {
			order_id,
			receipt,
			comment,
		})
		.await?;
	send(
		bot,
		msg.chat.id,
		preview,
		Some(keyboards::receipt_review(order_id).into()),
	)
	.await
}

pub async fn confirm_receipt(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: &User,
	state: State,
	order_id: i64,
) -> HandlerResult {
	let id = user_id(user);
	let chat = ChatId(id);
	let (receipt, comment) = match state {
		State::CardConfirm {
			order_id: pending,
			receipt,
			comment,
		} if pending == order_id => (receipt, comment),
		_ => return send(bot, chat, texts::INVALID_ORDER, None).await,
	};
	let mut conn = ctx.pool.acquire().await?;
	let submitted = orders::submit_receipt(
		&mut conn,
		order_id,
		id,
		receipt.file_id(),
		receipt.text.as_deref(),
		non_empty(&comment),
	)
	.await;
	drop(conn);
	dialogue.reset().await?;
	let order = match submitted {
		Ok(order) => order,
		Err(e) => return refuse(bot, ctx, chat, e).await,
	};
	send(
		bot,
		chat,
		format!(
			"🧾 Receipt for order #{} received. We will check it and let you know.",
			order.id
		),
		Some(keyboards::main_menu().into()),
	)
	.await?;

	let mut caption = format!(
		"🧾 New card payment\n{}",
		texts::admin_order_summary(&order, ctx.currency())
	);
	caption.push_str(&format!(
		"\nPaid by card: {}",
		texts::money(order.card_part(), ctx.currency())
	));
	if let Some(text) = receipt.text.as_deref() {
		caption.push_str(&format!("\n\nReceipt:\n{}", html_escape(text)));
	}
	let notified = match &receipt.file {
		Some((kind, file_id)) => {
			ctx.notifier
				.notify_admins_with_file(*kind, file_id, &caption, Some(order.id))
				.await
		}
		None => ctx.notifier.notify_admins(&caption, Some(order.id)).await,
	};
	if let Err(e) = notified {
		warn!("Admins were not told about the receipt of order #{}: {}", order.id, e);
	}
	Ok(())
}

pub async fn pay_wallet(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> HandlerResult {
	let Some(order) = payable_order(bot, ctx, dialogue, user, order_id).await? else {
		return Ok(());
	};
	let mut conn = ctx.pool.acquire().await?;
	let balance = wallet::balance(&mut conn, user).await?;
	drop(conn);
	let required = (order.payable() - order.wallet_reserved_amount).max(0);
	if balance < required {
		return refuse(
			bot,
			ctx,
			ChatId(user),
			StoreError::InsufficientBalance { balance, required },
		)
		.await;
	}
	dialogue.update(State::WalletComment { order_id }).await?;
	send(
		bot,
		ChatId(user),
		format!(
			"👛 {} will be taken from your wallet.\n\n📝 Anything our team should know? Send a comment, or \"none\".",
			texts::money(required, ctx.currency())
		),
		None,
	)
	.await
}

pub async fn on_wallet_comment(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> HandlerResult {
	let Some(text) = msg.text() else {
		return send(bot, msg.chat.id, "Please send the comment as text, or \"none\".", None).await;
	};
	let Some(order) = cart_order(ctx, user, order_id).await? else {
		dialogue.reset().await?;
		return send(bot, msg.chat.id, texts::INVALID_ORDER, None).await;
	};
	let comment = comment_of(text);
	let title = format!(
		"👛 Pay order #{} from your wallet: <b>{}</b>",
		order.id,
		texts::money(order.payable(), ctx.currency())
	);
	let preview = texts::comment_preview(&title, &comment);
	dialogue
		.update(State::WalletConfirm { order_id, comment })
		.await?;
	send(
		bot,
		msg.chat.id,
		preview,
		Some(keyboards::wallet_confirm(order_id).into()),
	)
	.await
}

pub async fn confirm_wallet(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: &User,
	state: State,
	order_id: i64,
) -> HandlerResult {
	let id = user_id(user);
	let chat = ChatId(id);
	let comment = match state {
		State::WalletConfirm {
			order_id: pending,
			comment,
		} if pending == order_id => comment,
		_ => return send(bot, chat, texts::INVALID_ORDER, None).await,
	};
	let mut conn = ctx.pool.acquire().await?;
	let paid = orders::pay_with_wallet(&mut conn, order_id, id, non_empty(&comment)).await;
	let order = match paid {
		Ok(order) => order,
		Err(e) => {
			drop(conn);
			dialogue.reset().await?;
			return refuse(bot, ctx, chat, e).await;
		}
	};
	let balance = wallet::balance(&mut conn, id).await?;
	drop(conn);
	dialogue.reset().await?;
	let shop = &ctx.settings.shop;
	send(
		bot,
		chat,
		format!(
			"✅ Order #{} was paid from your wallet.\nNew balance: <b>{}</b>\nExpect delivery within {} to {} hours.",
			order.id,
			texts::money(balance, ctx.currency()),
			shop.sla_hours_min,
			shop.sla_hours_max
		),
		Some(keyboards::main_menu().into()),
	)
	.await?;
	let text = format!(
		"👛 New wallet payment\n{}",
		texts::admin_order_summary(&order, ctx.currency())
	);
	if let Err(e) = ctx.notifier.notify_admins(&text, Some(order.id)).await {
		warn!("Admins were not told about wallet payment of order #{}: {}", order.id, e);
	}
	Ok(())
}

pub async fn pay_mixed(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> HandlerResult {
	let Some(order) = payable_order(bot, ctx, dialogue, user, order_id).await? else {
		return Ok(());
	};
	let mut conn = ctx.pool.acquire().await?;
	// An earlier reservation is released before the new one is taken
	let available = wallet::balance(&mut conn, user).await? + order.wallet_reserved_amount;
	drop(conn);
	if available <= 0 {
		return send(
			bot,
			ChatId(user),
			"Your wallet is empty, please pay by card instead.",
			None,
		)
		.await;
	}
	dialogue.update(State::MixedAmount { order_id }).await?;
	send(
		bot,
		ChatId(user),
		format!(
			"🔀 Order total: <b>{}</b>\nYour wallet: <b>{}</b>\n\nHow much of your wallet should go towards this order? The rest is paid by card.",
			texts::money(order.payable(), ctx.currency()),
			texts::money(available, ctx.currency())
		),
		None,
	)
	.await
}

pub async fn on_mixed_amount(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> HandlerResult {
	let chat = msg.chat.id;
	let Some(amount) = msg.text().and_then(parse_amount).filter(|a| *a > 0) else {
		return send(bot, chat, "Please send the amount as a positive number.", None).await;
	};
	let Some(order) = cart_order(ctx, user, order_id).await? else {
		dialogue.reset().await?;
		return send(bot, chat, texts::INVALID_ORDER, None).await;
	};
	if amount >= order.payable() {
		return send(
			bot,
			chat,
			"That covers the whole order, use the 👛 Wallet button instead or send a smaller amount.",
			None,
		)
		.await;
	}
	let mut conn = ctx.pool.acquire().await?;
	let reserved = orders::reserve_mixed(&mut conn, order_id, user, amount).await;
	drop(conn);
	let order = match reserved {
		Ok(order) => order,
		Err(e) => return refuse(bot, ctx, chat, e).await,
	};
	dialogue.update(State::CardReceipt { order_id }).await?;
	send(
		bot,
		chat,
		format!(
			"👛 {} of your wallet is held for this order.\n\n{}",
			texts::money(order.wallet_reserved_amount, ctx.currency()),
			texts::card_details(&ctx.settings.shop, order_id, order.card_part())
		),
		None,
	)
	.await
}

pub async fn pay_plan(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> HandlerResult {
	let Some(order) = payable_order(bot, ctx, dialogue, user, order_id).await? else {
		return Ok(());
	};
	let mut conn = ctx.pool.acquire().await?;
	let delivered_before = orders::user_has_delivered_order(&mut conn, user).await?;
	drop(conn);
	if !order.allow_first_plan || delivered_before {
		return refuse(bot, ctx, ChatId(user), StoreError::FirstPlanUnavailable(order_id)).await;
	}
	dialogue.update(State::PlanComment { order_id }).await?;
	send(
		bot,
		ChatId(user),
		"✨ With the first purchase plan you pay after delivery.\n\n📝 Anything our team should know? Send a comment, or \"none\".",
		None,
	)
	.await
}

pub async fn on_plan_comment(
	bot: &Bot,
	msg: &Message,
	dialogue: &ShopDialogue,
	order_id: i64,
) -> HandlerResult {
	let Some(text) = msg.text() else {
		return send(bot, msg.chat.id, "Please send the comment as text, or \"none\".", None).await;
	};
	let comment = comment_of(text);
	let preview = texts::comment_preview(
		&format!("✨ First purchase plan request for order #{}", order_id),
		&comment,
	);
	dialogue
		.update(State::PlanConfirm { order_id, comment })
		.await?;
	send(
		bot,
		msg.chat.id,
		preview,
		Some(keyboards::plan_review(order_id).into()),
	)
	.await
}

pub async fn confirm_plan(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: &User,
	state: State,
	order_id: i64,
) -> HandlerResult {
	let id = user_id(user);
	let chat = ChatId(id);
	let comment = match state {
		State::PlanConfirm {
			order_id: pending,
			comment,
		} if pending == order_id => comment,
		_ => return send(bot, chat, texts::INVALID_ORDER, None).await,
	};
	let mut conn = ctx.pool.acquire().await?;
	let requested = orders::request_first_plan(&mut conn, order_id, id, non_empty(&comment)).await;
	drop(conn);
	dialogue.reset().await?;
	let order = match requested {
		Ok(order) => order,
		Err(e) => return refuse(bot, ctx, chat, e).await,
	};
	send(
		bot,
		chat,
		format!(
			"✨ Your request for order #{} was sent. We will let you know once it is reviewed.",
			order.id
		),
		Some(keyboards::main_menu().into()),
	)
	.await?;
	let text = format!(
		"✨ First purchase plan request\n{}",
		texts::admin_order_summary(&order, ctx.currency())
	);
	if let Err(e) = ctx.notifier.notify_admins(&text, Some(order.id)).await {
		warn!("Admins were not told about plan request of order #{}: {}", order.id, e);
	}
	Ok(())
}

pub async fn cancel(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> HandlerResult {
	dialogue.reset().await?;
	let mut conn = ctx.pool.acquire().await?;
	let canceled = orders::cancel_by_user(&mut conn, order_id, user).await;
	drop(conn);
	match canceled {
		Ok(canceled) => {
			let mut text = format!("🗑️ Order #{} was canceled.", canceled.order.id);
			if canceled.refunded > 0 {
				text.push_str(&format!(
					"\n{} was returned to your wallet.",
					texts::money(canceled.refunded, ctx.currency())
				));
			}
			send(bot, ChatId(user), text, Some(keyboards::main_menu().into())).await
		}
		Err(e) => refuse(bot, ctx, ChatId(user), e).await,
	}
}

pub async fn ask_discount(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> HandlerResult {
	let Some(order) = cart_order(ctx, user, order_id).await? else {
		return send(bot, ChatId(user), texts::INVALID_ORDER, None).await;
	};
	if order.discount_id.is_some() {
		return refuse(bot, ctx, ChatId(user), StoreError::DiscountAlreadyApplied(order_id)).await;
	}
	if order.wallet_reserved_amount > 0 {
		return refuse(bot, ctx, ChatId(user), StoreError::DiscountAfterReservation(order_id)).await;
	}
	dialogue.update(State::DiscountCode { order_id }).await?;
	send(bot, ChatId(user), "🏷️ Send your discount code.", None).await
}

pub async fn on_discount_code(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	user: i64,
	order_id: i64,
) -> HandlerResult {
	let chat = msg.chat.id;
	let Some(code) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
		return send(bot, chat, "Please send the code as text.", None).await;
	};
	let mut conn = ctx.pool.acquire().await?;
	let applied = discounts::apply_to_order(&mut conn, order_id, user, code, now()).await;
	let applied = match applied {
		Ok(applied) => applied,
		Err(e) => {
			drop(conn);
			return refuse(bot, ctx, chat, e).await;
		}
	};
	let order = orders::require_order(&mut conn, order_id).await?;
	let plan_offered =
		order.allow_first_plan && !orders::user_has_delivered_order(&mut conn, user).await?;
	drop(conn);
	dialogue.reset().await?;
	send(
		bot,
		chat,
		format!(
			"🏷️ Code <b>{}</b> applied: -{}\nNew amount to pay: <b>{}</b>",
			html_escape(&applied.code),
			texts::money(applied.discount, ctx.currency()),
			texts::money(applied.payable, ctx.currency())
		),
		None,
	)
	.await?;
	send_checkout(bot, ctx, chat, &order, plan_offered).await
}
