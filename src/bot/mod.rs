//! The customer facing Telegram bot.
//!
//! Every update goes through [`dialogue::enter`] so handlers always see the chat's [`State`].
//! Commands and the reply keyboard reset that state; everything else is routed by it.

pub mod admin;
pub mod callback;
pub mod catalog;
pub mod checkout;
pub mod gate;
pub mod keyboards;
pub mod menu;
pub mod profile;
pub mod support;
pub mod texts;

use crate::config::Settings;
use crate::database::DbPool;
use crate::notify::{FileKind, Notifier};
use crate::store::catalog::AccountMode;
use crate::store::orders::OrderPolicy;
use crate::store::types::ServiceCategory;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use teloxide::dispatching::dialogue::{self, InMemStorage};
use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{BotCommand, ParseMode, ReplyMarkup};
use teloxide::utils::command::BotCommands;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;
pub type ShopDialogue = Dialogue<State, InMemStorage<State>>;

/// Shared by every handler through the dispatcher's dependency map.
pub struct BotContext {
	pub pool: DbPool,
	pub settings: Arc<Settings>,
	pub notifier: Arc<dyn Notifier>,
	/// Users that passed the channel check and when.
	pub(crate) membership: DashMap<i64, Instant>,
}

impl BotContext {
	pub fn new(pool: DbPool, settings: Arc<Settings>, notifier: Arc<dyn Notifier>) -> Self {
		Self {
			pool,
			settings,
			notifier,
			membership: DashMap::new(),
		}
	}

	pub fn order_policy(&self) -> OrderPolicy {
		OrderPolicy {
			payment_timeout: time::Duration::minutes(self.settings.shop.payment_timeout_min.into()),
			min_order_id: self.settings.shop.order_id_min_value,
		}
	}

	pub fn is_admin(&self, user_id: i64) -> bool {
		self.settings.bot.is_admin(user_id)
	}

	pub fn currency(&self) -> &str {
		&self.settings.shop.currency
	}
}

/// Proof of a card payment as the customer sent it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
	pub file: Option<(FileKind, String)>,
	pub text: Option<String>,
}

impl Receipt {
	pub fn file_id(&self) -> Option<&str> {
		self.file.as_ref().map(|(_, id)| id.as_str())
	}
}

/// Where a chat is in a multi message conversation.
#[derive(Clone, Debug, Default)]
pub enum State {
	#[default]
	Idle,
	WaitContact {
		order_id: i64,
	},
	CatalogRequest {
		product_id: i64,
	},
	CatalogUsername {
		product_id: i64,
		mode: Option<AccountMode>,
	},
	CatalogPassword {
		product_id: i64,
		mode: Option<AccountMode>,
		username: Option<String>,
	},
	CardReceipt {
		order_id: i64,
	},
	CardComment {
		order_id: i64,
		receipt: Receipt,
	},
	CardConfirm {
		order_id: i64,
		receipt: Receipt,
		comment: String,
	},
	WalletComment {
		order_id: i64,
	},
	WalletConfirm {
		order_id: i64,
		comment: String,
	},
	MixedAmount {
		order_id: i64,
	},
	PlanComment {
		order_id: i64,
	},
	PlanConfirm {
		order_id: i64,
		comment: String,
	},
	DiscountCode {
		order_id: i64,
	},
	CouponCode,
	ServiceRequest {
		category: ServiceCategory,
	},
	ServiceAttachment {
		category: ServiceCategory,
		text: String,
	},
	AdminMessage {
		order_id: i64,
	},
}

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Shop commands:")]
pub enum Command {
	#[command(description = "start the shop")]
	Start,
	#[command(description = "browse the catalog")]
	Products,
	#[command(description = "unpaid orders")]
	Cart,
	#[command(description = "wallet, coupons and history")]
	Profile,
	#[command(description = "contact support")]
	Support,
	#[command(description = "how ordering works")]
	Help,
}

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Admin commands:")]
pub enum AdminCommand {
	#[command(description = "admin overview")]
	Admin,
	#[command(description = "orders waiting for payment review")]
	Pending,
	#[command(description = "show an order by id")]
	Search(String),
}

pub fn schema() -> UpdateHandler<HandlerError> {
	let messages = Update::filter_message()
		.branch(teloxide::filter_command::<Command, _>().endpoint(menu::on_command))
		.branch(
			teloxide::filter_command::<AdminCommand, _>()
				.filter(|msg: Message, ctx: Arc<BotContext>| {
					msg.from
						.as_ref()
						.map_or(false, |user| ctx.is_admin(user.id.0 as i64))
				})
				.endpoint(admin::on_command),
		)
		.branch(dptree::endpoint(menu::on_message));
	let callbacks = Update::filter_callback_query().endpoint(menu::on_callback);

	dialogue::enter::<Update, InMemStorage<State>, State, _>()
		.branch(messages)
		.branch(callbacks)
}

pub async fn register_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
	let commands: Vec<BotCommand> = Command::bot_commands();
	bot.set_my_commands(commands).await?;
	Ok(())
}

/// Sends an HTML message, optionally with a keyboard.
pub(crate) async fn send(
	bot: &Bot,
	chat: ChatId,
	text: impl Into<String>,
	markup: Option<ReplyMarkup>,
) -> HandlerResult {
	let mut request = bot.send_message(chat, text).parse_mode(ParseMode::Html);
	if let Some(markup) = markup {
		request = request.reply_markup(markup);
	}
	request.await?;
	Ok(())
}

/// Tells the customer what went wrong when it is theirs to fix, anything else is a handler error.
pub(crate) async fn refuse(
	bot: &Bot,
	ctx: &BotContext,
	chat: ChatId,
	e: crate::store::StoreError,
) -> HandlerResult {
	if !e.is_user_facing() {
		return Err(e.into());
	}
	send(bot, chat, texts::store_error(&e, ctx.currency()), None).await
}

pub(crate) fn user_id(user: &teloxide::types::User) -> i64 {
	user.id.0 as i64
}
