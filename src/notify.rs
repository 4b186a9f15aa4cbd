//! Out of band messages to customers and admins.
//!
//! The store and the web panel only talk to Telegram through [`Notifier`], which keeps them
//! usable without a bot token and testable without a network.

use async_trait::async_trait;
use std::path::Path;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode};
use tracing::*;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
	#[error("telegram request failed: {0}")]
	Telegram(#[from] teloxide::RequestError),
	#[error("telegram file download failed: {0}")]
	Download(#[from] teloxide::DownloadError),
	#[error("notifications are disabled, no bot token is configured")]
	Disabled,
}

/// How a customer sent a file, it is forwarded the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
	Photo,
	Document,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedFile {
	pub data: Vec<u8>,
	pub mime: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
	async fn notify_user(&self, user_id: i64, html: &str) -> Result<(), NotifyError>;

	/// Sends to every admin, `order_actions` attaches the review buttons of that order.
	async fn notify_admins(&self, html: &str, order_actions: Option<i64>) -> Result<(), NotifyError>;

	async fn notify_admins_with_file(
		&self,
		kind: FileKind,
		file_id: &str,
		caption: &str,
		order_actions: Option<i64>,
	) -> Result<(), NotifyError>;

	async fn fetch_file(&self, file_id: &str) -> Result<FetchedFile, NotifyError>;
}

/// Escapes text a person typed before it is embedded in an HTML message.
pub fn html_escape(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			c => out.push(c),
		}
	}
	out
}

pub fn order_review_keyboard(order_id: i64) -> InlineKeyboardMarkup {
	InlineKeyboardMarkup::new(vec![
		vec![
			InlineKeyboardButton::callback("✅ Approve", format!("admin:approve:{}", order_id)),
			InlineKeyboardButton::callback("❌ Reject", format!("admin:reject:{}", order_id)),
		],
		vec![
			InlineKeyboardButton::callback("📦 Delivered", format!("admin:delivered:{}", order_id)),
			InlineKeyboardButton::callback("✉️ Message", format!("admin:msg:{}", order_id)),
		],
	])
}

fn mime_from_path(path: &str) -> Option<String> {
	let mime = match Path::new(path).extension()?.to_str()?.to_ascii_lowercase().as_str() {
		"jpg" | "jpeg" => "image/jpeg",
		"png" => "image/png",
		"webp" => "image/webp",
		"gif" => "image/gif",
		"pdf" => "application/pdf",
		"txt" => "text/plain",
		"zip" => "application/zip",
		_ => return None,
	};
	Some(mime.to_owned())
}

pub struct TelegramNotifier {
	bot: Bot,
	admin_ids: Vec<i64>,
}

impl TelegramNotifier {
	pub fn new(bot: Bot, admin_ids: Vec<i64>) -> Self {
		Self { bot, admin_ids }
	}
}

#[async_trait]
impl Notifier for TelegramNotifier {
	async fn notify_user(&self, user_id: i64, html: &str) -> Result<(), NotifyError> {
		self.bot
			.send_message(ChatId(user_id), html)
			.parse_mode(ParseMode::Html)
			.await
			.map_err(|e| {
				warn!("Failed notifying user {}: {}", user_id, e);
				e
			})?;
		Ok(())
	}

	async fn notify_admins(&self, html: &str, order_actions: Option<i64>) -> Result<(), NotifyError> {
		let mut failure = None;
		for admin_id in &self.admin_ids {
			let mut request = self
				.bot
				.send_message(ChatId(*admin_id), html)
				.parse_mode(ParseMode::Html);
			if let Some(order_id) = order_actions {
				request = request.reply_markup(order_review_keyboard(order_id));
			}
			if let Err(e) = request.await {
				warn!("Failed notifying admin {}: {}", admin_id, e);
				failure = Some(e);
			}
		}
		match failure {
			Some(e) => Err(e.into()),
			None => Ok(()),
		}
	}

	async fn notify_admins_with_file(
		&self,
		kind: FileKind,
		file_id: &str,
		caption: &str,
		order_actions: Option<i64>,
	) -> Result<(), NotifyError> {
		let mut failure = None;
		for admin_id in &self.admin_ids {
			let file = InputFile::file_id(file_id.to_owned());
			let keyboard = order_actions.map(order_review_keyboard);
			let sent = match kind {
				FileKind::Photo => {
					let mut request = self
						.bot
						.send_photo(ChatId(*admin_id), file)
						.caption(caption)
						.parse_mode(ParseMode::Html);
					if let Some(keyboard) = keyboard {
						request = request.reply_markup(keyboard);
					}
					request.await.map(|_| ())
				}
				FileKind::Document => {
					let mut request = self
						.bot
						.send_document(ChatId(*admin_id), file)
						.caption(caption)
						.parse_mode(ParseMode::Html);
					if let Some(keyboard) = keyboard {
						request = request.reply_markup(keyboard);
					}
					request.await.map(|_| ())
				}
			};
			if let Err(e) = sent {
				warn!("Failed sending a file to admin {}: {}", admin_id, e);
				failure = Some(e);
			}
		}
		match failure {
			Some(e) => Err(e.into()),
			None => Ok(()),
		}
	}

	async fn fetch_file(&self, file_id: &str) -> Result<FetchedFile, NotifyError> {
		let file = self.bot.get_file(file_id.to_owned()).await?;
		let mut data = Vec::with_capacity(file.meta.size as usize);
		self.bot.download_file(&file.path, &mut data).await?;
		Ok(FetchedFile {
			mime: mime_from_path(&file.path),
			data,
		})
	}
}

/// Used by the web panel when no bot token is configured.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
	async fn notify_user(&self, user_id: i64, _html: &str) -> Result<(), NotifyError> {
		debug!("Notifications are disabled, not messaging user {}", user_id);
		Ok(())
	}

	async fn notify_admins(&self, _html: &str, _order_actions: Option<i64>) -> Result<(), NotifyError> {
		debug!("Notifications are disabled, not messaging admins");
		Ok(())
	}

	async fn notify_admins_with_file(
		&self,
		_kind: FileKind,
		_file_id: &str,
		_caption: &str,
		_order_actions: Option<i64>,
	) -> Result<(), NotifyError> {
		Ok(())
	}

	async fn fetch_file(&self, _file_id: &str) -> Result<FetchedFile, NotifyError> {
		Err(NotifyError::Disabled)
	}
}

#[cfg(test)]
pub mod testing {
	use super::*;
	use std::sync::Mutex;

	#[derive(Clone, Debug, PartialEq, Eq)]
	pub enum Sent {
		User(i64, String),
		Admins(String, Option<i64>),
		AdminFile(FileKind, String, String),
	}

	/// Keeps every notification in memory so tests can assert on them.
	#[derive(Default)]
	pub struct RecordingNotifier {
		pub sent: Mutex<Vec<Sent>>,
	}

	impl RecordingNotifier {
		pub fn take(&self) -> Vec<Sent> {
			std::mem::take(&mut *self.sent.lock().unwrap())
		}

		pub fn user_messages(&self, user_id: i64) -> Vec<String> {
			self.sent
				.lock()
				.unwrap()
				.iter()
				.filter_map(|sent| match sent {
					Sent::User(id, text) if *id == user_id => Some(text.clone()),
					_ => None,
				})
				.collect()
		}
	}

	#[async_trait]
	impl Notifier for RecordingNotifier {
		async fn notify_user(&self, user_id: i64, html: &str) -> Result<(), NotifyError> {
			self.sent.lock().unwrap().push(Sent::User(user_id, html.to_owned()));
			Ok(())
		}

		async fn notify_admins(&self, html: &str, order_actions: Option<i64>) -> Result<(), NotifyError> {
			self.sent
				.lock()
				.unwrap()
				.push(Sent::Admins(html.to_owned(), order_actions));
			Ok(())
		}

		async fn notify_admins_with_file(
			&self,
			kind: FileKind,
			file_id: &str,
			caption: &str,
			_order_actions: Option<i64>,
		) -> Result<(), NotifyError> {
			self.sent.lock().unwrap().push(Sent::AdminFile(
				kind,
				file_id.to_owned(),
				caption.to_owned(),
			));
			Ok(())
		}

		async fn fetch_file(&self, file_id: &str) -> Result<FetchedFile, NotifyError> {
			Ok(FetchedFile {
				data: file_id.as_bytes().to_vec(),
				mime: Some("image/jpeg".to_owned()),
			})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_text_is_escaped() {
		assert_eq!(
			html_escape("<b>Tom & \"Jerry\"</b>"),
			"&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;"
		);
		assert_eq!(html_escape("plain"), "plain");
	}

	#[test]
	fn mime_types_follow_the_extension() {
		assert_eq!(mime_from_path("photos/file_1.JPG").as_deref(), Some("image/jpeg"));
		assert_eq!(mime_from_path("documents/file_2.pdf").as_deref(), Some("application/pdf"));
		assert_eq!(mime_from_path("documents/file_3"), None);
	}

	#[tokio::test]
	async fn disabled_notifier_cannot_fetch_files() {
		let notifier = DisabledNotifier;
		notifier.notify_user(1, "hi").await.unwrap();
		assert!(matches!(
			notifier.fetch_file("abc").await,
			Err(NotifyError::Disabled)
		));
	}
}
