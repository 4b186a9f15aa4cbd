use std::fmt::{Display, Formatter};
use std::str::FromStr;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
	format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const DISPLAY_FORMAT: &[FormatItem<'static>] =
	format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Lifecycle of an order, stored as its upper snake case name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	AwaitingPayment,
	PendingConfirm,
	PendingPlan,
	PlanConfirmed,
	Approved,
	InProgress,
	ReadyToDeliver,
	Delivered,
	Completed,
	Expired,
	Rejected,
	Canceled,
}

impl OrderStatus {
	pub const ALL: [OrderStatus; 12] = [
		OrderStatus::AwaitingPayment,
		OrderStatus::PendingConfirm,
		OrderStatus::PendingPlan,
		OrderStatus::PlanConfirmed,
		OrderStatus::Approved,
		OrderStatus::InProgress,
		OrderStatus::ReadyToDeliver,
		OrderStatus::Delivered,
		OrderStatus::Completed,
		OrderStatus::Expired,
		OrderStatus::Rejected,
		OrderStatus::Canceled,
	];

	pub const IN_PROGRESS: [OrderStatus; 5] = [
		OrderStatus::PendingConfirm,
		OrderStatus::PendingPlan,
		OrderStatus::Approved,
		OrderStatus::InProgress,
		OrderStatus::ReadyToDeliver,
	];

	pub const DONE: [OrderStatus; 2] = [OrderStatus::Delivered, OrderStatus::Completed];

	pub const PAID: [OrderStatus; 4] = [
		OrderStatus::InProgress,
		OrderStatus::ReadyToDeliver,
		OrderStatus::Delivered,
		OrderStatus::Completed,
	];

	pub const REVENUE: [OrderStatus; 5] = [
		OrderStatus::Approved,
		OrderStatus::InProgress,
		OrderStatus::ReadyToDeliver,
		OrderStatus::Delivered,
		OrderStatus::Completed,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			OrderStatus::AwaitingPayment => "AWAITING_PAYMENT",
			OrderStatus::PendingConfirm => "PENDING_CONFIRM",
			OrderStatus::PendingPlan => "PENDING_PLAN",
			OrderStatus::PlanConfirmed => "PLAN_CONFIRMED",
			OrderStatus::Approved => "APPROVED",
			OrderStatus::InProgress => "IN_PROGRESS",
			OrderStatus::ReadyToDeliver => "READY_TO_DELIVER",
			OrderStatus::Delivered => "DELIVERED",
			OrderStatus::Completed => "COMPLETED",
			OrderStatus::Expired => "EXPIRED",
			OrderStatus::Rejected => "REJECTED",
			OrderStatus::Canceled => "CANCELED",
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			OrderStatus::AwaitingPayment => "Awaiting payment",
			OrderStatus::PendingConfirm => "Payment under review",
			OrderStatus::PendingPlan => "First plan under review",
			OrderStatus::PlanConfirmed => "First plan confirmed",
			OrderStatus::Approved => "Payment approved",
			OrderStatus::InProgress => "In progress",
			OrderStatus::ReadyToDeliver => "Ready to deliver",
			OrderStatus::Delivered => "Delivered",
			OrderStatus::Completed => "Completed",
			OrderStatus::Expired => "Expired",
			OrderStatus::Rejected => "Rejected",
			OrderStatus::Canceled => "Canceled",
		}
	}

	pub fn is_paid(self) -> bool {
		Self::PAID.contains(&self)
	}
}

impl Display for OrderStatus {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, thiserror::Error)]
#[error("unknown value `{0}`")]
pub struct UnknownVariant(pub String);

impl FromStr for OrderStatus {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.iter()
			.copied()
			.find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| UnknownVariant(s.to_owned()))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, sqlx::Type, serde::Serialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
	Card,
	Wallet,
	Mixed,
	FirstPlan,
}

impl PaymentType {
	pub const ALL: [PaymentType; 4] = [
		PaymentType::Card,
		PaymentType::Wallet,
		PaymentType::Mixed,
		PaymentType::FirstPlan,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			PaymentType::Card => "CARD",
			PaymentType::Wallet => "WALLET",
			PaymentType::Mixed => "MIXED",
			PaymentType::FirstPlan => "FIRST_PLAN",
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			PaymentType::Card => "Card transfer",
			PaymentType::Wallet => "Wallet",
			PaymentType::Mixed => "Wallet + card",
			PaymentType::FirstPlan => "First purchase plan",
		}
	}
}

impl FromStr for PaymentType {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.iter()
			.copied()
			.find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| UnknownVariant(s.to_owned()))
	}
}

/// Wallet ledger entry kind; the stored amount is always positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, sqlx::Type, serde::Serialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletTxKind {
	Credit,
	Debit,
	Reserve,
	Refund,
}

impl WalletTxKind {
	pub const ALL: [WalletTxKind; 4] = [
		WalletTxKind::Credit,
		WalletTxKind::Debit,
		WalletTxKind::Reserve,
		WalletTxKind::Refund,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			WalletTxKind::Credit => "CREDIT",
			WalletTxKind::Debit => "DEBIT",
			WalletTxKind::Reserve => "RESERVE",
			WalletTxKind::Refund => "REFUND",
		}
	}
}

impl FromStr for WalletTxKind {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.iter()
			.copied()
			.find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| UnknownVariant(s.to_owned()))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, sqlx::Type, serde::Serialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCategory {
	BuildBot,
	OtherService,
	ProductRequest,
	TgReadyCountry,
}

impl ServiceCategory {
	pub const ALL: [ServiceCategory; 4] = [
		ServiceCategory::BuildBot,
		ServiceCategory::OtherService,
		ServiceCategory::ProductRequest,
		ServiceCategory::TgReadyCountry,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			ServiceCategory::BuildBot => "BUILD_BOT",
			ServiceCategory::OtherService => "OTHER_SERVICE",
			ServiceCategory::ProductRequest => "PRODUCT_REQUEST",
			ServiceCategory::TgReadyCountry => "TG_READY_COUNTRY",
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			ServiceCategory::BuildBot => "Bot building",
			ServiceCategory::OtherService => "Other services",
			ServiceCategory::ProductRequest => "Product requests",
			ServiceCategory::TgReadyCountry => "Ready accounts by country",
		}
	}
}

impl FromStr for ServiceCategory {
	type Err = UnknownVariant;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.iter()
			.copied()
			.find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| UnknownVariant(s.to_owned()))
	}
}

/// Parses an amount typed by a person, accepting `,`, `،` and `٬` as group separators.
pub fn parse_amount(input: &str) -> Option<i64> {
	let cleaned: String = input
		.chars()
		.filter(|c| !c.is_whitespace() && !matches!(c, ',' | '،' | '٬'))
		.map(|c| match c {
			// Eastern arabic and persian digits
			'\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
			'\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
			c => c,
		})
		.collect();
	if cleaned.is_empty() {
		return None;
	}
	cleaned.parse().ok()
}

pub fn format_amount(amount: i64) -> String {
	let digits = amount.unsigned_abs().to_string();
	let mut out = String::with_capacity(digits.len() + digits.len() / 3 * 2 + 1);
	if amount < 0 {
		out.push('-');
	}
	for (i, c) in digits.chars().enumerate() {
		if i > 0 && (digits.len() - i) % 3 == 0 {
			out.push('،');
		}
		out.push(c);
	}
	out
}

pub fn now() -> OffsetDateTime {
	OffsetDateTime::now_utc()
}

pub fn timestamp(at: OffsetDateTime) -> String {
	// The format only has numeric components so this cannot fail
	at.format(TIMESTAMP_FORMAT).unwrap_or_default()
}

pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
	let trimmed = value.get(..19).unwrap_or(value);
	PrimitiveDateTime::parse(trimmed, TIMESTAMP_FORMAT)
		.ok()
		.map(PrimitiveDateTime::assume_utc)
}

/// `2024-05-01T10:20:30` becomes `2024-05-01 10:20`, unparseable values pass through.
pub fn display_timestamp(value: &str) -> String {
	match parse_timestamp(value) {
		Some(at) => at.format(DISPLAY_FORMAT).unwrap_or_else(|_| value.to_owned()),
		None => value.to_owned(),
	}
}

/// Wallet notes written by coupon redemption are shown in a friendlier way.
pub fn display_wallet_note(note: &str) -> String {
	match note.strip_prefix("COUPON:") {
		Some(code) => format!("Coupon {}", code),
		None => note.to_owned(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use time::macros::datetime;

	#[test]
	fn amounts_accept_local_separators() {
		assert_eq!(parse_amount("1,250,000"), Some(1_250_000));
		assert_eq!(parse_amount("۱۲۵۰"), Some(1250));
		assert_eq!(parse_amount(" 3،500 "), Some(3500));
		assert_eq!(parse_amount("abc"), None);
		assert_eq!(parse_amount(""), None);
	}

	#[test]
	fn amounts_are_grouped_by_thousands() {
		assert_eq!(format_amount(0), "0");
		assert_eq!(format_amount(999), "999");
		assert_eq!(format_amount(1000), "1،000");
		assert_eq!(format_amount(1_250_000), "1،250،000");
		assert_eq!(format_amount(-25_000), "-25،000");
	}

	#[test]
	fn timestamps_sort_as_text() {
		let early = timestamp(datetime!(2024-01-09 23:59:59 UTC));
		let late = timestamp(datetime!(2024-01-10 00:00:00 UTC));
		assert_eq!(early, "2024-01-09T23:59:59");
		assert!(early < late);
		assert_eq!(display_timestamp(&late), "2024-01-10 00:00");
		assert_eq!(display_timestamp("garbage"), "garbage");
	}

	#[test]
	fn status_names_parse_back() {
		for status in OrderStatus::ALL {
			assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
		}
		assert!("SHIPPED".parse::<OrderStatus>().is_err());
		assert_eq!(display_wallet_note("COUPON:WELCOME"), "Coupon WELCOME");
	}
}
