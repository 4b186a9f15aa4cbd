//! Who may talk to the shop: blocked users are turned away and, when a channel is configured,
//! only its members get through.

use super::{keyboards, send, texts, user_id, BotContext, HandlerResult};
use crate::notify::html_escape;
use crate::store::users;
use std::time::{Duration, Instant};
use teloxide::prelude::*;
use teloxide::types::{Recipient, User};
use tracing::*;

const MEMBERSHIP_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
	Admitted,
	Blocked,
	NotMember,
}

/// The chat the bot asks Telegram about, a numeric id or an `@channel` name.
pub fn channel_recipient(channel: &str) -> Recipient {
	let channel = channel.trim();
	match channel.parse::<i64>() {
		Ok(id) => Recipient::Id(ChatId(id)),
		Err(_) if channel.starts_with('@') => Recipient::ChannelUsername(channel.to_owned()),
		Err(_) => Recipient::ChannelUsername(format!("@{}", channel)),
	}
}

/// Where the join button points.
pub fn join_url(channel: Option<&str>, link: Option<&str>) -> Option<String> {
	if let Some(link) = link.map(str::trim).filter(|l| !l.is_empty()) {
		return Some(link.to_owned());
	}
	let name = channel?.trim().strip_prefix('@')?;
	if name.is_empty() {
		return None;
	}
	Some(format!("https://t.me/{}", name))
}

impl BotContext {
	pub(crate) fn membership_cached(&self, user_id: i64) -> bool {
		match self.membership.get(&user_id) {
			Some(at) if at.elapsed() < MEMBERSHIP_TTL => true,
			Some(_) => {
				self.membership.remove(&user_id);
				false
			}
			None => false,
		}
	}

	pub(crate) fn remember_membership(&self, user_id: i64) {
		self.membership.insert(user_id, Instant::now());
	}
}

async fn is_member(bot: &Bot, ctx: &BotContext, channel: &str, user_id: i64) -> bool {
	if ctx.membership_cached(user_id) {
		return true;
	}
	let member = bot
		.get_chat_member(channel_recipient(channel), UserId(user_id as u64))
		.await;
	match member {
		Ok(member) if member.kind.is_present() => {
			ctx.remember_membership(user_id);
			true
		}
		Ok(_) => false,
		Err(e) => {
			warn!(
				"Unable to check membership of user {} in {}: {}",
				user_id, channel, e
			);
			false
		}
	}
}

/// Records the user and decides whether they may continue.
pub async fn check(bot: &Bot, ctx: &BotContext, user: &User) -> Result<Verdict, super::HandlerError> {
	let id = user_id(user);
	let mut conn = ctx.pool.acquire().await?;
	users::ensure_user(&mut conn, id, user.username.as_deref(), Some(&user.first_name)).await?;
	if users::is_blocked(&mut conn, id).await? {
		return Ok(Verdict::Blocked);
	}
	drop(conn);
	if ctx.is_admin(id) {
		return Ok(Verdict::Admitted);
	}
	if let Some(channel) = ctx.settings.shop.required_channel_id.as_deref() {
		if !is_member(bot, ctx, channel, id).await {
			return Ok(Verdict::NotMember);
		}
	}
	Ok(Verdict::Admitted)
}

pub async fn send_force_join(bot: &Bot, ctx: &BotContext, chat: ChatId) -> HandlerResult {
	let shop = &ctx.settings.shop;
	let url = join_url(
		shop.required_channel_id.as_deref(),
		shop.required_channel_link.as_deref(),
	);
	send(
		bot,
		chat,
		html_escape(&shop.force_join_message),
		Some(keyboards::force_join(url.as_deref()).into()),
	)
	.await
}

/// Runs the gate for a message, telling the user why when they are stopped.
pub async fn admit_message(bot: &Bot, ctx: &BotContext, user: &User, chat: ChatId) -> Result<bool, super::HandlerError> {
	match check(bot, ctx, user).await? {
		Verdict::Admitted => Ok(true),
		Verdict::Blocked => {
			send(bot, chat, texts::NOT_ALLOWED, None).await?;
			Ok(false)
		}
		Verdict::NotMember => {
			send_force_join(bot, ctx, chat).await?;
			Ok(false)
		}
	}
}

/// Same as [`admit_message`] for button presses, the answer shows as an alert.
pub async fn admit_callback(bot: &Bot, ctx: &BotContext, q: &CallbackQuery) -> Result<bool, super::HandlerError> {
	match check(bot, ctx, &q.from).await? {
		Verdict::Admitted => Ok(true),
		Verdict::Blocked => {
			bot.answer_callback_query(q.id.clone())
				.text(texts::NOT_ALLOWED)
				.show_alert(true)
				.await?;
			Ok(false)
		}
		Verdict::NotMember => {
			bot.answer_callback_query(q.id.clone())
				.text("Please join the channel first.")
				.show_alert(true)
				.await?;
			send_force_join(bot, ctx, ChatId(user_id(&q.from))).await?;
			Ok(false)
		}
	}
}

/// The `I joined` button: forget any stale answer and ask Telegram again.
pub async fn recheck(bot: &Bot, ctx: &BotContext, q: &CallbackQuery) -> HandlerResult {
	let id = user_id(&q.from);
	ctx.membership.remove(&id);
	match check(bot, ctx, &q.from).await? {
		Verdict::Admitted => {
			bot.answer_callback_query(q.id.clone()).text("Thanks for joining!").await?;
			send(
				bot,
				ChatId(id),
				texts::welcome(&ctx.settings.shop.business_name),
				Some(keyboards::main_menu().into()),
			)
			.await
		}
		Verdict::Blocked => {
			bot.answer_callback_query(q.id.clone())
				.text(texts::NOT_ALLOWED)
				.show_alert(true)
				.await?;
			Ok(())
		}
		Verdict::NotMember => {
			bot.answer_callback_query(q.id.clone())
				.text("You have not joined the channel yet.")
				.show_alert(true)
				.await?;
			Ok(())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Settings;
	use crate::notify::DisabledNotifier;
	use std::sync::Arc;

	#[test]
	fn numeric_channels_are_chat_ids() {
		assert_eq!(
			channel_recipient("-1001234567890"),
			Recipient::Id(ChatId(-1001234567890))
		);
		assert_eq!(
			channel_recipient("@shop_news"),
			Recipient::ChannelUsername("@shop_news".to_owned())
		);
		assert_eq!(
			channel_recipient("shop_news"),
			Recipient::ChannelUsername("@shop_news".to_owned())
		);
	}

	#[test]
	fn join_link_prefers_the_configured_one() {
		assert_eq!(
			join_url(Some("@shop_news"), Some("https://t.me/+invite")).as_deref(),
			Some("https://t.me/+invite")
		);
		assert_eq!(
			join_url(Some("@shop_news"), None).as_deref(),
			Some("https://t.me/shop_news")
		);
		assert_eq!(join_url(Some("-100123"), Some("  ")), None);
	}

	#[tokio::test]
	async fn membership_is_cached_per_user() {
		let ctx = BotContext::new(
			crate::database::memory_pool().await.unwrap(),
			Arc::new(Settings::from_lookup(|_| None).unwrap()),
			Arc::new(DisabledNotifier),
		);
		assert!(!ctx.membership_cached(5));
		ctx.remember_membership(5);
		assert!(ctx.membership_cached(5));
		assert!(!ctx.membership_cached(6));
	}
}
