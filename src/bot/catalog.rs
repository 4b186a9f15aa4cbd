use super::{checkout, keyboards, send, texts, user_id, BotContext, HandlerResult, ShopDialogue, State};
use crate::notify::html_escape;
use crate::store::catalog::{AccountMode, Catalog, Product};
use crate::store::messages::{create_service_message, NewServiceMessage};
use crate::store::orders::{create_order, user_has_delivered_order, NewOrder};
use crate::store::types::{now, ServiceCategory};
use teloxide::prelude::*;
use teloxide::types::User;
use tracing::*;

const UNAVAILABLE: &str = "This item is not available right now.";

async fn load(ctx: &BotContext) -> Result<Catalog, super::HandlerError> {
	let mut conn = ctx.pool.acquire().await?;
	Ok(Catalog::load(&mut conn).await?)
}

pub async fn show_root(bot: &Bot, ctx: &BotContext, chat: ChatId) -> HandlerResult {
	let catalog = load(ctx).await?;
	let children = catalog.public_children(None);
	if children.is_empty() {
		return send(bot, chat, "There are no products available yet, please check back later.", None).await;
	}
	send(
		bot,
		chat,
		"🛍️ <b>Products</b>\nPick a category:",
		Some(keyboards::product_list(&children, None).into()),
	)
	.await
}

pub async fn open_category(bot: &Bot, ctx: &BotContext, chat: ChatId, id: i64) -> HandlerResult {
	let catalog = load(ctx).await?;
	let Some(category) = catalog.find_public(id).filter(|p| p.is_category) else {
		return send(bot, chat, UNAVAILABLE, None).await;
	};
	let children = catalog.public_children(Some(id));
	let path = html_escape(&catalog.path(id).join(" › "));
	send(
		bot,
		chat,
		format!("🛍️ <b>{}</b>\nPick an item:", path),
		Some(keyboards::product_list(&children, Some(category)).into()),
	)
	.await
}

fn describe(catalog: &Catalog, product: &Product, currency: &str) -> String {
	let mut text = format!("<b>{}</b>", html_escape(&catalog.path(product.id).join(" › ")));
	if !product.description.trim().is_empty() {
		text.push_str(&format!("\n\n{}", html_escape(product.description.trim())));
	}
	if product.request_only {
		text.push_str("\n\nThis item is made to order. Send us a request and we will get back to you with a price.");
		return text;
	}
	let modes = product.account_modes();
	if modes.is_empty() {
		text.push_str(&format!("\n\nPrice: <b>{}</b>", texts::price(product.price, currency)));
	} else {
		text.push('\n');
		for mode in modes {
			let price = product.price_for(Some(mode)).unwrap_or_default();
			text.push_str(&format!("\n{}: <b>{}</b>", mode.label(), texts::price(price, currency)));
		}
	}
	text
}

pub async fn view_product(bot: &Bot, ctx: &BotContext, chat: ChatId, id: i64) -> HandlerResult {
	let catalog = load(ctx).await?;
	let Some(product) = catalog.find_public(id).filter(|p| !p.is_category) else {
		return send(bot, chat, UNAVAILABLE, None).await;
	};
	send(
		bot,
		chat,
		describe(&catalog, product, ctx.currency()),
		Some(keyboards::product_actions(product, ctx.currency()).into()),
	)
	.await
}

pub async fn buy(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: &User,
	id: i64,
	mode: Option<AccountMode>,
) -> HandlerResult {
	let chat = ChatId(user_id(user));
	let catalog = load(ctx).await?;
	let Some(product) = catalog.find_public(id).filter(|p| !p.is_category) else {
		return send(bot, chat, UNAVAILABLE, None).await;
	};
	if product.request_only {
		dialogue.update(State::CatalogRequest { product_id: id }).await?;
		return send(
			bot,
			chat,
			format!(
				"📝 Tell us what you need for <b>{}</b> and we will reply with an offer.",
				html_escape(&product.title)
			),
			Some(keyboards::main_menu().into()),
		)
		.await;
	}
	if mode.is_none() && !product.account_modes().is_empty() {
		return send(
			bot,
			chat,
			"Choose how you want the account delivered:",
			Some(keyboards::product_actions(product, ctx.currency()).into()),
		)
		.await;
	}
	let Some(price) = product.price_for(mode) else {
		return send(bot, chat, "This option is not available for this item.", None).await;
	};
	if price <= 0 {
		return send(
			bot,
			chat,
			"The price of this item has not been set yet, please ask support.",
			None,
		)
		.await;
	}
	if product.require_username {
		dialogue
			.update(State::CatalogUsername { product_id: id, mode })
			.await?;
		return send(
			bot,
			chat,
			"Send the username or email of the account this order is for.",
			None,
		)
		.await;
	}
	if product.require_password {
		dialogue
			.update(State::CatalogPassword {
				product_id: id,
				mode,
				username: None,
			})
			.await?;
		return send(bot, chat, "Send the password of the account this order is for.", None).await;
	}
	place_order(bot, ctx, dialogue, user, id, mode, None, None).await
}

pub async fn on_username(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	user: &User,
	product_id: i64,
	mode: Option<AccountMode>,
) -> HandlerResult {
	let Some(username) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
		return send(bot, msg.chat.id, "Please send the username as text.", None).await;
	};
	let requires_password = {
		let catalog = load(ctx).await?;
		catalog.get(product_id).map_or(false, |p| p.require_password)
	};
	if requires_password {
		dialogue
			.update(State::CatalogPassword {
				product_id,
				mode,
				username: Some(username.to_owned()),
			})
			.await?;
		return send(bot, msg.chat.id, "Now send the password of the account.", None).await;
	}
	place_order(bot, ctx, dialogue, user, product_id, mode, Some(username.to_owned()), None).await
}

#[allow(clippy::too_many_arguments)]
pub async fn on_password(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	user: &User,
	product_id: i64,
	mode: Option<AccountMode>,
	username: Option<String>,
) -> HandlerResult {
	let Some(password) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
		return send(bot, msg.chat.id, "Please send the password as text.", None).await;
	};
	place_order(
		bot,
		ctx,
		dialogue,
		user,
		product_id,
		mode,
		username,
		Some(password.to_owned()),
	)
	.await
}

#[allow(clippy::too_many_arguments)]
async fn place_order(
	bot: &Bot,
	ctx: &BotContext,
	dialogue: &ShopDialogue,
	user: &User,
	product_id: i64,
	mode: Option<AccountMode>,
	username: Option<String>,
	password: Option<String>,
) -> HandlerResult {
	let id = user_id(user);
	let chat = ChatId(id);
	dialogue.reset().await?;
	let mut conn = ctx.pool.acquire().await?;
	let catalog = Catalog::load(&mut conn).await?;
	let Some(product) = catalog.find_public(product_id).filter(|p| !p.is_category) else {
		return send(bot, chat, UNAVAILABLE, None).await;
	};
	let Some(price) = product.price_for(mode).filter(|price| *price > 0) else {
		return send(bot, chat, UNAVAILABLE, None).await;
	};
	let mut title = catalog.path(product_id).join(" / ");
	if let Some(mode) = mode {
		title.push_str(&format!(" ({})", mode.label()));
	}
	let new = NewOrder {
		user_id: id,
		username: user.username.clone(),
		first_name: Some(user.first_name.clone()),
		title,
		amount_total: price,
		currency: ctx.currency().to_owned(),
		service_category: "CATALOG".to_owned(),
		service_code: format!("product:{}", product_id),
		account_mode: mode.map(|m| m.as_str().to_owned()),
		require_username: product.require_username,
		require_password: product.require_password,
		customer_username: username,
		customer_password: password,
		allow_first_plan: product.allow_first_plan,
		cashback_percent: product.effective_cashback_percent(),
		..NewOrder::default()
	};
	let order = create_order(&mut conn, new, &ctx.order_policy(), now()).await?;
	let plan_offered = order.allow_first_plan && !user_has_delivered_order(&mut conn, id).await?;
	drop(conn);
	checkout::send_checkout(bot, ctx, chat, &order, plan_offered).await
}

pub async fn on_request_text(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	user: &User,
	product_id: i64,
) -> HandlerResult {
	let Some(text) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
		return send(bot, msg.chat.id, "Please describe your request in a text message.", None).await;
	};
	let mut conn = ctx.pool.acquire().await?;
	let catalog = Catalog::load(&mut conn).await?;
	let path = catalog.path(product_id).join(" / ");
	let new = NewServiceMessage {
		user_id: user_id(user),
		username: user.username.clone(),
		first_name: Some(user.first_name.clone()),
		category: ServiceCategory::ProductRequest,
		text: format!("{}\n\n{}", path, text),
		attachment_file_id: None,
	};
	let message_id = create_service_message(&mut conn, &new).await?;
	drop(conn);
	dialogue.reset().await?;
	info!("Product request #{} from user {}", message_id, new.user_id);
	let admin_text = format!(
		"📝 New product request #{}\nFrom: <a href=\"tg://user?id={}\">{}</a>\nItem: {}\n\n{}",
		message_id,
		new.user_id,
		html_escape(&user.first_name),
		html_escape(&path),
		html_escape(text)
	);
	if let Err(e) = ctx.notifier.notify_admins(&admin_text, None).await {
		warn!("Product request #{} was stored but admins were not told: {}", message_id, e);
	}
	send(
		bot,
		msg.chat.id,
		"✅ Your request was sent, we will get back to you soon.",
		Some(keyboards::main_menu().into()),
	)
	.await
}
