//! Everything the bot says, kept apart from the handlers so the web panel can reuse the
//! customer notifications.

use crate::config::ShopSettings;
use crate::notify::html_escape;
use crate::store::orders::Order;
use crate::store::types::{display_timestamp, format_amount, parse_timestamp, OrderStatus};
use crate::store::users::UserStats;
use crate::store::{CodeError, StoreError};
use time::OffsetDateTime;

pub const BTN_PRODUCTS: &str = "🛍️ Products";
pub const BTN_CART: &str = "🧺 Cart";
pub const BTN_PROFILE: &str = "👤 Profile";
pub const BTN_SUPPORT: &str = "🛟 Support";
pub const BTN_SHARE_CONTACT: &str = "📱 Share my number";
pub const BTN_CANCEL: &str = "Cancel";

pub const HELP: &str = "ℹ️ <b>How to order</b>\n\n\
	1. Open 🛍️ Products and pick what you need.\n\
	2. The order lands in your 🧺 Cart, pay it before the timer runs out.\n\
	3. Pay by card, from your wallet, or mix both.\n\
	4. We confirm the payment and deliver.\n\n\
	/products - browse the catalog\n\
	/cart - unpaid orders\n\
	/profile - wallet, coupons and history\n\
	/support - talk to us";

pub const NOT_ALLOWED: &str = "⛔ Your access to this shop has been restricted.";
pub const INVALID_ORDER: &str = "The order is invalid or has expired.";
pub const CONTACT_REQUIRED: &str = "To pay you need to verify your phone number. \
	Please share it with the button below.";

pub fn welcome(business_name: &str) -> String {
	format!(
		"👋 Welcome to <b>{}</b>!\n\nUse the menu below to browse products, check your cart or reach support.",
		html_escape(business_name)
	)
}

pub fn money(amount: i64, currency: &str) -> String {
	format!("{} {}", format_amount(amount), currency)
}

pub fn price(amount: i64, currency: &str) -> String {
	if amount <= 0 {
		"price not set".to_owned()
	} else {
		money(amount, currency)
	}
}

/// Words a customer can send instead of a comment.
pub fn is_skip_word(text: &str) -> bool {
	matches!(
		text.trim().to_lowercase().as_str(),
		"none" | "-" | "no" | "skip" | "no comment"
	)
}

/// Time left until the deadline as `mm:ss`, clamped at zero.
pub fn countdown(deadline: Option<&str>, at: OffsetDateTime) -> Option<String> {
	let deadline = parse_timestamp(deadline?)?;
	let remaining = (deadline - at).whole_seconds().max(0);
	Some(format!("{:02}:{:02}", remaining / 60, remaining % 60))
}

pub fn order_card(order: &Order, currency: &str) -> String {
	let mut text = format!(
		"📦 <b>{}</b>\nOrder: <code>#{}</code>\nAmount: <b>{}</b>\n",
		html_escape(&order.plan_title),
		order.id,
		money(order.amount_total, currency)
	);
	if order.discount_amount > 0 {
		text.push_str(&format!(
			"Discount: <b>{}</b>\n",
			money(order.discount_amount, currency)
		));
	}
	text.push_str(&format!(
		"Payment: <b>{}</b>\nPaid from wallet: <b>{}</b>\nStatus: <b>{}</b>\nPlaced: <b>{}</b>",
		order.payment_type.map(|p| p.label()).unwrap_or("—"),
		money(order.wallet_used_amount, currency),
		order.status.label(),
		display_timestamp(&order.created_at)
	));
	if let Some(mode) = order.account_mode.as_deref().filter(|m| !m.is_empty()) {
		text.push_str(&format!("\nAccount: <b>{}</b>", html_escape(mode)));
	}
	if let Some(username) = order.customer_username.as_deref() {
		text.push_str(&format!("\nLogin: <code>{}</code>", html_escape(username)));
	}
	text
}

pub fn checkout_prompt(order: &Order, currency: &str) -> String {
	let mut text = format!(
		"✅ Order <code>#{}</code> for <b>{}</b> was added to your cart.\n\nAmount: <b>{}</b>\n",
		order.id,
		html_escape(&order.plan_title),
		money(order.amount_total, currency)
	);
	if order.discount_amount > 0 {
		text.push_str(&format!("To pay: <b>{}</b>\n", money(order.payable(), currency)));
	}
	text.push_str("\nChoose how you want to pay:");
	text
}

pub fn cart_entry(order: &Order, currency: &str, at: OffsetDateTime) -> String {
	let mut text = format!(
		"🧺 Order #{} · <b>{}</b>\nTotal: <b>{}</b>\n",
		order.id,
		html_escape(&order.plan_title),
		money(order.amount_total, currency)
	);
	if let Some(code) = order.discount_code.as_deref() {
		text.push_str(&format!(
			"Discount {}: <b>-{}</b>\n",
			html_escape(code),
			money(order.discount_amount, currency)
		));
	}
	text.push_str(&format!(
		"Reserved from wallet: <b>{}</b>\nLeft to pay by card: <b>{}</b>\nStatus: <b>{}</b>",
		money(order.wallet_reserved_amount, currency),
		money(order.card_part(), currency),
		order.status.label()
	));
	if let Some(left) = countdown(order.await_deadline.as_deref(), at) {
		text.push_str(&format!("\n⏳ Time left: {}", left));
	}
	text
}

pub fn card_details(shop: &ShopSettings, order_id: i64, amount: i64) -> String {
	format!(
		"💳 Card payment for order #{}\n\
		Amount: <b>{}</b>\n\
		• Card number: <code>{}</code>\n\
		• Holder: {}\n\n\
		After paying, send a photo or file of the receipt, or its text.",
		order_id,
		money(amount, &shop.currency),
		html_escape(&shop.card_number),
		html_escape(&shop.card_name)
	)
}

pub fn comment_preview(title: &str, comment: &str) -> String {
	let comment = if comment.is_empty() {
		"—".to_owned()
	} else {
		format!("\n{}", html_escape(comment))
	};
	format!(
		"{}\n\n📝 Your comment: {}\n\nPick one of the options below to continue.",
		title, comment
	)
}

pub fn order_expired(order_id: i64, timeout_min: u32, refunded: i64, currency: &str) -> String {
	let mut text = format!(
		"⌛ Order #{} expired because it was not paid within {} minutes.",
		order_id, timeout_min
	);
	if refunded > 0 {
		text.push_str(&format!(
			"\n{} reserved from your wallet was returned.",
			money(refunded, currency)
		));
	}
	text
}

/// What the customer is told when an admin moves their order along.
pub fn status_update(order: &Order, refunded: i64, plan_approved: bool, shop: &ShopSettings) -> String {
	let id = order.id;
	let mut text = match order.status {
		OrderStatus::InProgress if plan_approved => format!(
			"✨ Your first purchase plan request for order #{} was approved. We are working on it, expect delivery within {} to {} hours.",
			id, shop.sla_hours_min, shop.sla_hours_max
		),
		OrderStatus::InProgress | OrderStatus::Approved => format!(
			"✅ Payment for order #{} was confirmed. We are working on it, expect delivery within {} to {} hours.",
			id, shop.sla_hours_min, shop.sla_hours_max
		),
		OrderStatus::ReadyToDeliver => format!("📦 Order #{} is ready to be delivered.", id),
		OrderStatus::Delivered => format!("📦 Order #{} has been delivered. Thank you for your purchase!", id),
		OrderStatus::Completed => format!("🎉 Order #{} is completed.", id),
		OrderStatus::Rejected => format!("❌ Order #{} was rejected.", id),
		OrderStatus::Canceled => format!("Order #{} was canceled.", id),
		status => format!("Order #{} is now «<b>{}</b>».", id, status.label()),
	};
	if order.status == OrderStatus::Completed {
		if let Some(note) = order.manager_note.as_deref().filter(|n| !n.trim().is_empty()) {
			text.push_str(&format!("\n\n📝 {}", html_escape(note)));
		}
	}
	if refunded > 0 {
		text.push_str(&format!(
			"\n{} was returned to your wallet.",
			money(refunded, &shop.currency)
		));
	}
	text
}

pub fn profile(stats: &UserStats, currency: &str) -> String {
	format!(
		"👤 <b>Your profile</b>\n\
		• Wallet balance: <b>{}</b>\n\
		• Orders: <b>{}</b>\n\
		• In progress: <b>{}</b>\n\
		• Completed: <b>{}</b>\n\
		• Referrals: <b>{}</b>\n\
		• Earnings: <b>{}</b>",
		money(stats.wallet_balance, currency),
		stats.orders_total,
		stats.orders_in_progress,
		stats.orders_done,
		stats.ref_count,
		money(stats.earnings_total, currency)
	)
}

/// Who placed an order, for admin messages.
pub fn customer_line(order: &Order) -> String {
	let name = order
		.first_name
		.as_deref()
		.filter(|n| !n.is_empty())
		.map(html_escape)
		.unwrap_or_else(|| order.user_id.to_string());
	let username = order
		.username
		.as_deref()
		.filter(|n| !n.is_empty())
		.map(|n| format!("@{}", html_escape(n)))
		.unwrap_or_else(|| "—".to_owned());
	format!(
		"Customer: <a href=\"tg://user?id={}\">{}</a> ({})",
		order.user_id, name, username
	)
}

pub fn admin_order_summary(order: &Order, currency: &str) -> String {
	let mut text = format!(
		"Order #{}\n{}\nItem: {} | {}\nStatus: {}\nPlaced: {}",
		order.id,
		customer_line(order),
		html_escape(&order.plan_title),
		money(order.payable(), currency),
		order.status.label(),
		display_timestamp(&order.created_at)
	);
	if let Some(payment) = order.payment_type {
		text.push_str(&format!("\nPayment: {}", payment.label()));
	}
	if let Some(comment) = order.customer_message.as_deref().filter(|c| !c.is_empty()) {
		text.push_str(&format!("\n\n📝 Customer comment:\n{}", html_escape(comment)));
	}
	text
}

/// A note from the shop team, about one order or about the account.
pub fn manager_message(order_id: Option<i64>, text: &str) -> String {
	match order_id {
		Some(id) => format!("✉️ Message about order #{}:\n\n{}", id, html_escape(text)),
		None => format!("✉️ Message from the shop team:\n\n{}", html_escape(text)),
	}
}

/// `delta` is signed the way it moved the balance.
pub fn wallet_adjusted(delta: i64, balance: i64, note: &str, currency: &str) -> String {
	let head = if delta >= 0 {
		format!("💰 {} was added to your wallet.", money(delta, currency))
	} else {
		format!("💸 {} was deducted from your wallet.", money(-delta, currency))
	};
	let mut text = head;
	if !note.trim().is_empty() {
		text.push_str(&format!("\nNote: {}", html_escape(note.trim())));
	}
	text.push_str(&format!("\nNew balance: <b>{}</b>", money(balance, currency)));
	text
}

pub fn access_changed(blocked: bool) -> &'static str {
	if blocked {
		NOT_ALLOWED
	} else {
		"✅ Your access to the shop has been restored."
	}
}

pub fn support_reply(message_id: i64, text: &str) -> String {
	format!(
		"📨 Reply to your request #{}:\n\n{}",
		message_id,
		html_escape(text)
	)
}

/// A store refusal in words a customer understands.
pub fn store_error(e: &StoreError, currency: &str) -> String {
	let text = match e {
		StoreError::InsufficientBalance { balance, required } => {
			return format!(
				"Your wallet balance is {}, but {} is needed.",
				money(*balance, currency),
				money(*required, currency)
			)
		}
		StoreError::OrderNotFound(_) | StoreError::NotOwner(_) | StoreError::InvalidOrderState { .. } => {
			INVALID_ORDER
		}
		StoreError::FirstPlanUnavailable(_) => {
			"The first purchase plan is only available before your first delivered order."
		}
		StoreError::DiscountAlreadyApplied(_) => "A discount code is already applied to this order.",
		StoreError::DiscountAfterReservation(_) => {
			"Part of this order is already paid from your wallet, a discount code can no longer be added."
		}
		StoreError::DiscountNotApplicable => "This discount code does not apply to this item.",
		StoreError::InvalidAmount(_) => "That amount is not valid.",
		StoreError::Code(CodeError::NotFound | CodeError::InvalidAmount) => "This code is not valid.",
		StoreError::Code(CodeError::Inactive) => "This code is no longer active.",
		StoreError::Code(CodeError::UsageLimitReached) => "This code has been used up.",
		StoreError::Code(CodeError::Expired) => "This code has expired.",
		StoreError::Code(CodeError::UserLimitReached) => "You have already used this code.",
		other => return format!("⚠️ {}", other),
	};
	text.to_owned()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Settings;
	use time::macros::datetime;

	fn order(status: OrderStatus) -> Order {
		Order {
			id: 42,
			user_id: 7,
			username: Some("buyer".to_owned()),
			first_name: Some("Sam <3".to_owned()),
			plan_title: "ChatGPT Plus".to_owned(),
			receipt_file_id: None,
			receipt_text: None,
			status,
			created_at: "2024-03-01T12:00:00".to_owned(),
			updated_at: "2024-03-01T12:00:00".to_owned(),
			amount_total: 1_250_000,
			currency: "Toman".to_owned(),
			service_category: "CATALOG".to_owned(),
			service_code: "product:3".to_owned(),
			account_mode: None,
			customer_email: None,
			payment_type: None,
			wallet_used_amount: 0,
			wallet_reserved_amount: 0,
			await_deadline: Some("2024-03-01T12:15:00".to_owned()),
			notes: None,
			customer_message: None,
			manager_note: Some("Login details were sent by email".to_owned()),
			internal_cost: 0,
			net_revenue: 0,
			require_username: false,
			require_password: false,
			customer_username: None,
			customer_password: None,
			allow_first_plan: false,
			cashback_percent: 0,
			cashback_applied_amount: 0,
			discount_id: None,
			discount_code: None,
			discount_amount: 0,
		}
	}

	fn shop() -> ShopSettings {
		Settings::from_lookup(|_| None).unwrap().shop
	}

	#[test]
	fn countdown_is_minutes_and_seconds() {
		let at = datetime!(2024-03-01 12:03:20 UTC);
		assert_eq!(countdown(Some("2024-03-01T12:15:00"), at).as_deref(), Some("11:40"));
		assert_eq!(
			countdown(Some("2024-03-01T12:00:00"), at).as_deref(),
			Some("00:00")
		);
		assert_eq!(countdown(None, at), None);
	}

	#[test]
	fn skip_words_clear_the_comment() {
		assert!(is_skip_word(" None "));
		assert!(is_skip_word("-"));
		assert!(!is_skip_word("please hurry"));
	}

	#[test]
	fn completed_orders_carry_the_manager_note() {
		let text = status_update(&order(OrderStatus::Completed), 0, false, &shop());
		assert!(text.contains("#42 is completed"));
		assert!(text.contains("Login details were sent by email"));

		let text = status_update(&order(OrderStatus::Delivered), 0, false, &shop());
		assert!(!text.contains("Login details"));
	}

	#[test]
	fn rejections_state_the_refund() {
		let text = status_update(&order(OrderStatus::Rejected), 50_000, false, &shop());
		assert!(text.contains("rejected"));
		assert!(text.contains("50،000 Toman was returned"));
	}

	#[test]
	fn approvals_mention_the_delivery_window() {
		let text = status_update(&order(OrderStatus::InProgress), 0, true, &shop());
		assert!(text.contains("first purchase plan"));
		assert!(text.contains("within 1 to 4 hours"));
	}

	#[test]
	fn customer_names_are_escaped() {
		let line = customer_line(&order(OrderStatus::PendingConfirm));
		assert!(line.contains("Sam &lt;3"));
		assert!(line.contains("@buyer"));
	}

	#[test]
	fn store_errors_read_well() {
		let text = store_error(
			&StoreError::InsufficientBalance {
				balance: 1000,
				required: 25_000,
			},
			"Toman",
		);
		assert_eq!(text, "Your wallet balance is 1،000 Toman, but 25،000 Toman is needed.");
		assert_eq!(
			store_error(&StoreError::Code(CodeError::Expired), "Toman"),
			"This code has expired."
		);
		assert_eq!(store_error(&StoreError::NotOwner(4), "Toman"), INVALID_ORDER);
	}

	#[test]
	fn expiry_mentions_the_refund_only_when_there_is_one() {
		assert!(!order_expired(5, 15, 0, "Toman").contains("returned"));
		let text = order_expired(5, 15, 2000, "Toman");
		assert!(text.contains("within 15 minutes"));
		assert!(text.contains("2،000 Toman"));
	}

	#[test]
	fn wallet_adjustments_show_direction_and_balance() {
		let text = wallet_adjusted(-5_000, 20_000, "", "Toman");
		assert!(text.contains("5،000 Toman was deducted"));
		assert!(text.contains("New balance: <b>20،000 Toman</b>"));
		assert!(!text.contains("Note"));
		let text = wallet_adjusted(3_000, 23_000, "Gift <3", "Toman");
		assert!(text.contains("3،000 Toman was added"));
		assert!(text.contains("Note: Gift &lt;3"));
	}
}
