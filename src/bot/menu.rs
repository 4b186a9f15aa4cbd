use super::callback::Callback;
use super::{
	admin, catalog, checkout, gate, keyboards, profile, send, support, texts, user_id, BotContext,
	Command, HandlerResult, ShopDialogue, State,
};
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::*;

pub async fn on_command(
	bot: Bot,
	msg: Message,
	cmd: Command,
	dialogue: ShopDialogue,
	ctx: Arc<BotContext>,
) -> HandlerResult {
	let Some(user) = msg.from.as_ref() else {
		return Ok(());
	};
	if !gate::admit_message(&bot, &ctx, user, msg.chat.id).await? {
		return Ok(());
	}
	dialogue.reset().await?;
	let chat = msg.chat.id;
	match cmd {
		Command::Start => {
			send(
				&bot,
				chat,
				texts::welcome(&ctx.settings.shop.business_name),
				Some(keyboards::main_menu().into()),
			)
			.await
		}
		Command::Products => catalog::show_root(&bot, &ctx, chat).await,
		Command::Cart => checkout::show_cart(&bot, &ctx, chat, user_id(user)).await,
		Command::Profile => profile::show(&bot, &ctx, chat, user_id(user)).await,
		Command::Support => support::show(&bot, &ctx, chat).await,
		Command::Help => send(&bot, chat, texts::HELP, Some(keyboards::main_menu().into())).await,
	}
}

/// Plain messages: the reply keyboard first, then whatever the conversation is waiting for.
pub async fn on_message(
	bot: Bot,
	msg: Message,
	dialogue: ShopDialogue,
	state: State,
	ctx: Arc<BotContext>,
) -> HandlerResult {
	let Some(user) = msg.from.clone() else {
		return Ok(());
	};
	let chat = msg.chat.id;
	if !gate::admit_message(&bot, &ctx, &user, chat).await? {
		return Ok(());
	}
	let id = user_id(&user);

	if let Some(text) = msg.text() {
		let handled = match text {
			texts::BTN_PRODUCTS => Some(catalog::show_root(&bot, &ctx, chat).await),
			texts::BTN_CART => Some(checkout::show_cart(&bot, &ctx, chat, id).await),
			texts::BTN_PROFILE => Some(profile::show(&bot, &ctx, chat, id).await),
			texts::BTN_SUPPORT => Some(support::show(&bot, &ctx, chat).await),
			texts::BTN_CANCEL => Some(
				send(&bot, chat, "Canceled.", Some(keyboards::main_menu().into())).await,
			),
			_ => None,
		};
		if let Some(result) = handled {
			dialogue.reset().await?;
			return result;
		}
	}

	match state {
		State::Idle => {
			if msg.contact().is_some() {
				return checkout::on_contact(&bot, &ctx, &msg, &dialogue, &user, None).await;
			}
			send(
				&bot,
				chat,
				"Please use the menu below.",
				Some(keyboards::main_menu().into()),
			)
			.await
		}
		State::WaitContact { order_id } => {
			checkout::on_contact(&bot, &ctx, &msg, &dialogue, &user, Some(order_id)).await
		}
		State::CatalogRequest { product_id } => {
			catalog::on_request_text(&bot, &ctx, &msg, &dialogue, &user, product_id).await
		}
		State::CatalogUsername { product_id, mode } => {
			catalog::on_username(&bot, &ctx, &msg, &dialogue, &user, product_id, mode).await
		}
		State::CatalogPassword {
			product_id,
			mode,
			username,
		} => catalog::on_password(&bot, &ctx, &msg, &dialogue, &user, product_id, mode, username).await,
		State::CardReceipt { order_id } => {
			checkout::on_receipt(&bot, &msg, &dialogue, order_id).await
		}
		State::CardComment { order_id, receipt } => {
			checkout::on_card_comment(&bot, &msg, &dialogue, order_id, receipt).await
		}
		State::WalletComment { order_id } => {
			checkout::on_wallet_comment(&bot, &ctx, &msg, &dialogue, id, order_id).await
		}
		State::MixedAmount { order_id } => {
			checkout::on_mixed_amount(&bot, &ctx, &msg, &dialogue, id, order_id).await
		}
		State::PlanComment { order_id } => {
			checkout::on_plan_comment(&bot, &msg, &dialogue, order_id).await
		}
		State::DiscountCode { order_id } => {
			checkout::on_discount_code(&bot, &ctx, &msg, &dialogue, id, order_id).await
		}
		State::CouponCode => profile::on_coupon_code(&bot, &ctx, &msg, &dialogue, id).await,
		State::ServiceRequest { category } => {
			support::on_request_text(&bot, &msg, &dialogue, category).await
		}
		State::ServiceAttachment { category, text } => {
			support::on_attachment(&bot, &ctx, &msg, &dialogue, &user, category, text).await
		}
		State::AdminMessage { order_id } => {
			admin::on_message_text(&bot, &ctx, &msg, &dialogue, id, order_id).await
		}
		State::CardConfirm { .. } | State::WalletConfirm { .. } | State::PlanConfirm { .. } => {
			send(
				&bot,
				chat,
				"Please use the buttons above to confirm or change.",
				None,
			)
			.await
		}
	}
}

pub async fn on_callback(
	bot: Bot,
	q: CallbackQuery,
	dialogue: ShopDialogue,
	state: State,
	ctx: Arc<BotContext>,
) -> HandlerResult {
	let Some(cb) = q.data.as_deref().and_then(Callback::parse) else {
		debug!("Ignoring unknown callback data {:?}", q.data);
		bot.answer_callback_query(q.id.clone()).await?;
		return Ok(());
	};
	let id = user_id(&q.from);

	if cb.is_admin_action() {
		if !ctx.is_admin(id) {
			bot.answer_callback_query(q.id.clone())
				.text("Only admins can do that.")
				.show_alert(true)
				.await?;
			return Ok(());
		}
		return admin::on_callback(&bot, &ctx, &q, &dialogue, cb).await;
	}
	if cb == Callback::ForceJoinCheck {
		return gate::recheck(&bot, &ctx, &q).await;
	}
	if !gate::admit_callback(&bot, &ctx, &q).await? {
		return Ok(());
	}
	bot.answer_callback_query(q.id.clone()).await?;
	let chat = ChatId(id);

	match cb {
		Callback::CatalogRoot => catalog::show_root(&bot, &ctx, chat).await,
		Callback::OpenCategory(product_id) => {
			catalog::open_category(&bot, &ctx, chat, product_id).await
		}
		Callback::ViewProduct(product_id) => {
			catalog::view_product(&bot, &ctx, chat, product_id).await
		}
		Callback::Buy(product_id, mode) => {
			catalog::buy(&bot, &ctx, &dialogue, &q.from, product_id, mode).await
		}
		Callback::PayCard(order_id) => checkout::pay_card(&bot, &ctx, &dialogue, id, order_id).await,
		Callback::PayWallet(order_id) => {
			checkout::pay_wallet(&bot, &ctx, &dialogue, id, order_id).await
		}
		Callback::PayMixed(order_id) => {
			checkout::pay_mixed(&bot, &ctx, &dialogue, id, order_id).await
		}
		Callback::PayPlan(order_id) => checkout::pay_plan(&bot, &ctx, &dialogue, id, order_id).await,
		Callback::CancelOrder(order_id) => {
			checkout::cancel(&bot, &ctx, &dialogue, id, order_id).await
		}
		Callback::Discount(order_id) => {
			checkout::ask_discount(&bot, &ctx, &dialogue, id, order_id).await
		}
		Callback::ReceiptConfirm(order_id) => {
			checkout::confirm_receipt(&bot, &ctx, &dialogue, &q.from, state, order_id).await
		}
		Callback::ReceiptEdit(order_id) => {
			dialogue.update(State::CardReceipt { order_id }).await?;
			send(&bot, chat, "Send the receipt again, as a photo, a file or text.", None).await
		}
		Callback::WalletConfirm(order_id) => {
			checkout::confirm_wallet(&bot, &ctx, &dialogue, &q.from, state, order_id).await
		}
		Callback::PlanConfirm(order_id) => {
			checkout::confirm_plan(&bot, &ctx, &dialogue, &q.from, state, order_id).await
		}
		Callback::PlanEdit(order_id) => {
			dialogue.update(State::PlanComment { order_id }).await?;
			send(&bot, chat, "Send your comment again, or \"none\".", None).await
		}
		Callback::Coupon => profile::ask_coupon(&bot, &dialogue, chat).await,
		Callback::CouponCancel => {
			dialogue.reset().await?;
			send(&bot, chat, "Coupon entry canceled.", Some(keyboards::main_menu().into())).await
		}
		Callback::HistoryMenu => profile::history_menu(&bot, chat).await,
		Callback::History(category, page) => {
			profile::history_page(&bot, &ctx, chat, id, category, page).await
		}
		Callback::HistoryBack => profile::show(&bot, &ctx, chat, id).await,
		Callback::BuildBot | Callback::OtherService => {
			support::ask_request(&bot, &dialogue, chat, cb).await
		}
		Callback::ForceJoinCheck
		| Callback::AdminApprove(_)
		| Callback::AdminReject(_)
		| Callback::AdminDelivered(_)
		| Callback::AdminMessage(_) => Ok(()),
	}
}
