use crate::store::catalog::AccountMode;
use crate::store::orders::HistoryCategory;

/// Everything an inline button can ask for, parsed from its `callback_data`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callback {
	CatalogRoot,
	OpenCategory(i64),
	ViewProduct(i64),
	Buy(i64, Option<AccountMode>),
	PayCard(i64),
	PayWallet(i64),
	PayMixed(i64),
	PayPlan(i64),
	CancelOrder(i64),
	Discount(i64),
	ReceiptConfirm(i64),
	ReceiptEdit(i64),
	WalletConfirm(i64),
	PlanConfirm(i64),
	PlanEdit(i64),
	Coupon,
	CouponCancel,
	HistoryMenu,
	History(HistoryCategory, u32),
	HistoryBack,
	BuildBot,
	OtherService,
	ForceJoinCheck,
	AdminApprove(i64),
	AdminReject(i64),
	AdminDelivered(i64),
	AdminMessage(i64),
}

impl Callback {
	pub fn parse(data: &str) -> Option<Self> {
		let parts: Vec<&str> = data.split(':').collect();
		let id = |index: usize| parts.get(index).and_then(|p| p.parse::<i64>().ok());
		let cb = match parts.as_slice() {
			["prod", "root"] => Callback::CatalogRoot,
			["prod", "open", _] => Callback::OpenCategory(id(2)?),
			["prod", "view", _] => Callback::ViewProduct(id(2)?),
			["prod", "buy", _] => Callback::Buy(id(2)?, None),
			["prod", "buy", _, mode] => Callback::Buy(id(2)?, Some(AccountMode::parse(mode)?)),
			["cart", "paycard", _] => Callback::PayCard(id(2)?),
			["cart", "paywallet", _] => Callback::PayWallet(id(2)?),
			["cart", "paymix", _] => Callback::PayMixed(id(2)?),
			["cart", "payplan", _] => Callback::PayPlan(id(2)?),
			["cart", "cancel", _] => Callback::CancelOrder(id(2)?),
			["cart", "discount", _] => Callback::Discount(id(2)?),
			["cart", "rcpt", "confirm", _] => Callback::ReceiptConfirm(id(3)?),
			["cart", "rcpt", "edit", _] => Callback::ReceiptEdit(id(3)?),
			["cart", "wallet", "confirm", _] => Callback::WalletConfirm(id(3)?),
			["cart", "plan", "confirm", _] => Callback::PlanConfirm(id(3)?),
			["cart", "plan", "edit", _] => Callback::PlanEdit(id(3)?),
			["profile", "coupon"] => Callback::Coupon,
			["profile", "coupon", "cancel"] => Callback::CouponCancel,
			["hist", "menu"] => Callback::HistoryMenu,
			["hist", "back"] => Callback::HistoryBack,
			["hist", "show", category, page] => {
				let page = page.strip_prefix('p')?.parse().ok()?;
				Callback::History(HistoryCategory::parse(category)?, page)
			}
			["svc", "build"] => Callback::BuildBot,
			["svc", "other"] => Callback::OtherService,
			["forcejoin", "check"] => Callback::ForceJoinCheck,
			["admin", "approve", _] => Callback::AdminApprove(id(2)?),
			["admin", "reject", _] => Callback::AdminReject(id(2)?),
			["admin", "delivered", _] => Callback::AdminDelivered(id(2)?),
			["admin", "msg", _] => Callback::AdminMessage(id(2)?),
			_ => return None,
		};
		Some(cb)
	}

	pub fn data(self) -> String {
		match self {
			Callback::CatalogRoot => "prod:root".to_owned(),
			Callback::OpenCategory(id) => format!("prod:open:{}", id),
			Callback::ViewProduct(id) => format!("prod:view:{}", id),
			Callback::Buy(id, None) => format!("prod:buy:{}", id),
			Callback::Buy(id, Some(mode)) => format!("prod:buy:{}:{}", id, mode.as_str()),
			Callback::PayCard(id) => format!("cart:paycard:{}", id),
			Callback::PayWallet(id) => format!("cart:paywallet:{}", id),
			Callback::PayMixed(id) => format!("cart:paymix:{}", id),
			Callback::PayPlan(id) => format!("cart:payplan:{}", id),
			Callback::CancelOrder(id) => format!("cart:cancel:{}", id),
			Callback::Discount(id) => format!("cart:discount:{}", id),
			Callback::ReceiptConfirm(id) => format!("cart:rcpt:confirm:{}", id),
			Callback::ReceiptEdit(id) => format!("cart:rcpt:edit:{}", id),
			Callback::WalletConfirm(id) => format!("cart:wallet:confirm:{}", id),
			Callback::PlanConfirm(id) => format!("cart:plan:confirm:{}", id),
			Callback::PlanEdit(id) => format!("cart:plan:edit:{}", id),
			Callback::Coupon => "profile:coupon".to_owned(),
			Callback::CouponCancel => "profile:coupon:cancel".to_owned(),
			Callback::HistoryMenu => "hist:menu".to_owned(),
			Callback::History(category, page) => format!("hist:show:{}:p{}", category.as_str(), page),
			Callback::HistoryBack => "hist:back".to_owned(),
			Callback::BuildBot => "svc:build".to_owned(),
			Callback::OtherService => "svc:other".to_owned(),
			Callback::ForceJoinCheck => "forcejoin:check".to_owned(),
			Callback::AdminApprove(id) => format!("admin:approve:{}", id),
			Callback::AdminReject(id) => format!("admin:reject:{}", id),
			Callback::AdminDelivered(id) => format!("admin:delivered:{}", id),
			Callback::AdminMessage(id) => format!("admin:msg:{}", id),
		}
	}

	pub fn is_admin_action(self) -> bool {
		matches!(
			self,
			Callback::AdminApprove(_)
				| Callback::AdminReject(_)
				| Callback::AdminDelivered(_)
				| Callback::AdminMessage(_)
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_the_buy_variants() {
		assert_eq!(Callback::parse("prod:buy:12"), Some(Callback::Buy(12, None)));
		assert_eq!(
			Callback::parse("prod:buy:12:pre"),
			Some(Callback::Buy(12, Some(AccountMode::Prebuilt)))
		);
		assert_eq!(
			Callback::parse("prod:buy:12:self"),
			Some(Callback::Buy(12, Some(AccountMode::OwnAccount)))
		);
		assert_eq!(Callback::parse("prod:buy:12:other"), None);
	}

	#[test]
	fn history_pages_carry_their_category() {
		assert_eq!(
			Callback::parse("hist:show:inprog:p2"),
			Some(Callback::History(HistoryCategory::InProgress, 2))
		);
		assert_eq!(Callback::parse("hist:show:done:2"), None);
		assert_eq!(Callback::History(HistoryCategory::All, 0).data(), "hist:show:all:p0");
	}

	#[test]
	fn admin_buttons_match_the_review_keyboard() {
		let keyboard = crate::notify::order_review_keyboard(7);
		let parsed: Vec<Callback> = keyboard
			.inline_keyboard
			.iter()
			.flatten()
			.filter_map(|button| match &button.kind {
				teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => Callback::parse(data),
				_ => None,
			})
			.collect();
		assert_eq!(
			parsed,
			vec![
				Callback::AdminApprove(7),
				Callback::AdminReject(7),
				Callback::AdminDelivered(7),
				Callback::AdminMessage(7),
			]
		);
		assert!(parsed.iter().all(|cb| cb.is_admin_action()));
	}

	#[test]
	fn rejects_garbage() {
		assert_eq!(Callback::parse(""), None);
		assert_eq!(Callback::parse("cart:paycard:abc"), None);
		assert_eq!(Callback::parse("cart:rcpt:confirm"), None);
	}

	#[test]
	fn data_is_what_parse_reads() {
		for cb in [
			Callback::CatalogRoot,
			Callback::CouponCancel,
			Callback::ReceiptEdit(9),
			Callback::PlanConfirm(3),
			Callback::ForceJoinCheck,
		] {
			assert_eq!(Callback::parse(&cb.data()), Some(cb));
		}
	}
}
