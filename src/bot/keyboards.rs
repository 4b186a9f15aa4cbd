use super::callback::Callback;
use super::texts;
use crate::store::catalog::Product;
use crate::store::orders::{HistoryCategory, Order};
use teloxide::types::{
	ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

fn button(text: impl Into<String>, cb: Callback) -> InlineKeyboardButton {
	InlineKeyboardButton::callback(text, cb.data())
}

pub fn main_menu() -> KeyboardMarkup {
	KeyboardMarkup::new(vec![
		vec![
			KeyboardButton::new(texts::BTN_PRODUCTS),
			KeyboardButton::new(texts::BTN_CART),
		],
		vec![
			KeyboardButton::new(texts::BTN_PROFILE),
			KeyboardButton::new(texts::BTN_SUPPORT),
		],
	])
	.resize_keyboard()
}

pub fn request_contact() -> KeyboardMarkup {
	KeyboardMarkup::new(vec![
		vec![KeyboardButton::new(texts::BTN_SHARE_CONTACT).request(ButtonRequest::Contact)],
		vec![KeyboardButton::new(texts::BTN_CANCEL)],
	])
	.resize_keyboard()
}

/// One button per visible child, then a way back up.
pub fn product_list(children: &[&Product], parent: Option<&Product>) -> InlineKeyboardMarkup {
	let mut rows: Vec<Vec<InlineKeyboardButton>> = children
		.iter()
		.map(|product| {
			let cb = if product.is_category {
				Callback::OpenCategory(product.id)
			} else {
				Callback::ViewProduct(product.id)
			};
			let title = if product.is_category {
				format!("📁 {}", product.title)
			} else {
				product.title.clone()
			};
			vec![button(title, cb)]
		})
		.collect();
	if let Some(parent) = parent {
		let back = match parent.parent_id {
			Some(grandparent) => Callback::OpenCategory(grandparent),
			None => Callback::CatalogRoot,
		};
		rows.push(vec![button("⬅️ Back", back)]);
	}
	InlineKeyboardMarkup::new(rows)
}

pub fn product_actions(product: &Product, currency: &str) -> InlineKeyboardMarkup {
	let mut rows = Vec::new();
	let modes = product.account_modes();
	if product.request_only {
		rows.push(vec![button("📝 Request this", Callback::Buy(product.id, None))]);
	} else if modes.is_empty() {
		rows.push(vec![button("🛒 Buy", Callback::Buy(product.id, None))]);
	} else {
		for mode in modes {
			let price = product.price_for(Some(mode)).unwrap_or_default();
			rows.push(vec![button(
				format!("{} · {}", mode.label(), texts::price(price, currency)),
				Callback::Buy(product.id, Some(mode)),
			)]);
		}
	}
	let back = match product.parent_id {
		Some(parent) => Callback::OpenCategory(parent),
		None => Callback::CatalogRoot,
	};
	rows.push(vec![button("⬅️ Back", back)]);
	InlineKeyboardMarkup::new(rows)
}

pub fn cart_actions(order: &Order, plan_offered: bool) -> InlineKeyboardMarkup {
	let id = order.id;
	let mut rows = vec![
		vec![
			button("💳 Card", Callback::PayCard(id)),
			button("👛 Wallet", Callback::PayWallet(id)),
		],
		vec![button("🔀 Wallet + card", Callback::PayMixed(id))],
	];
	if plan_offered {
		rows.push(vec![button("✨ First purchase plan", Callback::PayPlan(id))]);
	}
	if order.discount_id.is_none() && order.wallet_reserved_amount == 0 {
		rows.push(vec![button("🏷️ Discount code", Callback::Discount(id))]);
	}
	rows.push(vec![button("🗑️ Cancel order", Callback::CancelOrder(id))]);
	InlineKeyboardMarkup::new(rows)
}

pub fn receipt_review(order_id: i64) -> InlineKeyboardMarkup {
	InlineKeyboardMarkup::new(vec![vec![
		button("✅ Send for review", Callback::ReceiptConfirm(order_id)),
		button("✏️ Change", Callback::ReceiptEdit(order_id)),
	]])
}

pub fn wallet_confirm(order_id: i64) -> InlineKeyboardMarkup {
	InlineKeyboardMarkup::new(vec![vec![
		button("✅ Pay from wallet", Callback::WalletConfirm(order_id)),
		button("🗑️ Cancel order", Callback::CancelOrder(order_id)),
	]])
}

pub fn plan_review(order_id: i64) -> InlineKeyboardMarkup {
	InlineKeyboardMarkup::new(vec![vec![
		button("✅ Send request", Callback::PlanConfirm(order_id)),
		button("✏️ Change comment", Callback::PlanEdit(order_id)),
	]])
}

pub fn profile_actions() -> InlineKeyboardMarkup {
	InlineKeyboardMarkup::new(vec![
		vec![button("🎟️ Redeem a coupon", Callback::Coupon)],
		vec![button("📜 Order history", Callback::HistoryMenu)],
	])
}

pub fn coupon_cancel() -> InlineKeyboardMarkup {
	InlineKeyboardMarkup::new(vec![vec![button("Cancel", Callback::CouponCancel)]])
}

pub fn history_menu() -> InlineKeyboardMarkup {
	InlineKeyboardMarkup::new(vec![
		vec![
			button("⏳ In progress", Callback::History(HistoryCategory::InProgress, 0)),
			button("✅ Done", Callback::History(HistoryCategory::Done, 0)),
		],
		vec![button("📦 All orders", Callback::History(HistoryCategory::All, 0))],
		vec![button("⬅️ Back", Callback::HistoryBack)],
	])
}

pub fn history_more(category: HistoryCategory, next_page: Option<u32>) -> InlineKeyboardMarkup {
	let mut rows = Vec::new();
	if let Some(page) = next_page {
		rows.push(vec![button("More ➡️", Callback::History(category, page))]);
	}
	rows.push(vec![button("⬅️ Back", Callback::HistoryMenu)]);
	InlineKeyboardMarkup::new(rows)
}

/// A link to the support account when one is configured, then the service requests.
pub fn support_menu(support_url: Option<&str>) -> InlineKeyboardMarkup {
	let mut rows = Vec::new();
	if let Some(url) = support_url.and_then(|u| u.parse().ok()) {
		rows.push(vec![InlineKeyboardButton::url("💬 Message support", url)]);
	}
	rows.push(vec![button("🤖 Build me a bot", Callback::BuildBot)]);
	rows.push(vec![button("🧩 Other services", Callback::OtherService)]);
	InlineKeyboardMarkup::new(rows)
}

pub fn force_join(join_url: Option<&str>) -> InlineKeyboardMarkup {
	let mut rows = Vec::new();
	if let Some(url) = join_url.and_then(|u| u.parse().ok()) {
		rows.push(vec![InlineKeyboardButton::url("📢 Join the channel", url)]);
	}
	rows.push(vec![button("✅ I joined", Callback::ForceJoinCheck)]);
	InlineKeyboardMarkup::new(rows)
}
