use super::callback::Callback;
use super::{keyboards, send, texts, user_id, BotContext, HandlerResult, ShopDialogue, State};
use crate::notify::{html_escape, FileKind};
use crate::store::messages::{create_service_message, NewServiceMessage};
use crate::store::types::ServiceCategory;
use teloxide::prelude::*;
use teloxide::types::User;
use tracing::*;

pub fn support_url(username: Option<&str>) -> Option<String> {
	let name = username?.trim().trim_start_matches('@');
	if name.is_empty() {
		return None;
	}
	Some(format!("https://t.me/{}", name))
}

pub async fn show(bot: &Bot, ctx: &BotContext, chat: ChatId) -> HandlerResult {
	let username = ctx.settings.shop.support_username.as_deref();
	let mut text = "🛟 <b>Support</b>\n".to_owned();
	match username {
		Some(name) => text.push_str(&format!(
			"Questions about an order? Message @{} and we will help.",
			html_escape(name)
		)),
		None => text.push_str("Questions about an order? Reply here and an admin will contact you."),
	}
	text.push_str("\n\nLooking for something custom? Pick a service below.");
	send(
		bot,
		chat,
		text,
		Some(keyboards::support_menu(support_url(username).as_deref()).into()),
	)
	.await
}

pub async fn ask_request(bot: &Bot, dialogue: &ShopDialogue, chat: ChatId, cb: Callback) -> HandlerResult {
	let category = match cb {
		Callback::BuildBot => ServiceCategory::BuildBot,
		_ => ServiceCategory::OtherService,
	};
	dialogue.update(State::ServiceRequest { category }).await?;
	send(
		bot,
		chat,
		format!(
			"<b>{}</b>\nDescribe what you need in one message.",
			category.label()
		),
		None,
	)
	.await
}

pub async fn on_request_text(
	bot: &Bot,
	msg: &Message,
	dialogue: &ShopDialogue,
	category: ServiceCategory,
) -> HandlerResult {
	let Some(text) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
		return send(bot, msg.chat.id, "Please describe your request as text.", None).await;
	};
	dialogue
		.update(State::ServiceAttachment {
			category,
			text: text.to_owned(),
		})
		.await?;
	send(
		bot,
		msg.chat.id,
		"📎 You can attach a photo or a file now, or send \"skip\".",
		None,
	)
	.await
}

fn attachment_of(msg: &Message) -> Option<(FileKind, String)> {
	if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
		return Some((FileKind::Photo, photo.file.id.to_string()));
	}
	msg.document()
		.map(|doc| (FileKind::Document, doc.file.id.to_string()))
}

pub async fn on_attachment(
	bot: &Bot,
	ctx: &BotContext,
	msg: &Message,
	dialogue: &ShopDialogue,
	user: &User,
	category: ServiceCategory,
	text: String,
) -> HandlerResult {
	let attachment = attachment_of(msg);
	let skipped = msg
		.text()
		.map_or(false, |t| texts::is_skip_word(t) || t.trim().eq_ignore_ascii_case("done"));
	if attachment.is_none() && !skipped {
		return send(
			bot,
			msg.chat.id,
			"Please send a photo or a file, or \"skip\".",
			None,
		)
		.await;
	}
	let new = NewServiceMessage {
		user_id: user_id(user),
		username: user.username.clone(),
		first_name: Some(user.first_name.clone()),
		category,
		text,
		attachment_file_id: attachment.as_ref().map(|(_, id)| id.clone()),
	};
	let mut conn = ctx.pool.acquire().await?;
	let message_id = create_service_message(&mut conn, &new).await?;
	drop(conn);
	dialogue.reset().await?;
	info!(
		"Service request #{} ({}) from user {}",
		message_id,
		category.as_str(),
		new.user_id
	);

	let caption = format!(
		"📨 New request #{} · {}\nFrom: <a href=\"tg://user?id={}\">{}</a>\n\n{}",
		message_id,
		category.label(),
		new.user_id,
		html_escape(&user.first_name),
		html_escape(&new.text)
	);
	let notified = match &attachment {
		Some((kind, file_id)) => {
			ctx.notifier
				.notify_admins_with_file(*kind, file_id, &caption, None)
				.await
		}
		None => ctx.notifier.notify_admins(&caption, None).await,
	};
	if let Err(e) = notified {
		warn!("Admins were not told about request #{}: {}", message_id, e);
	}
	send(
		bot,
		msg.chat.id,
		"✅ Thanks! Your request was sent and we will reply here soon.",
		Some(keyboards::main_menu().into()),
	)
	.await
}
