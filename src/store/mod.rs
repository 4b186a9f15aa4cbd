pub mod catalog;
pub mod coupons;
pub mod discounts;
pub mod messages;
pub mod orders;
pub mod reports;
pub mod types;
pub mod users;
pub mod wallet;

use crate::database::{DbPool, Migrations};
use crate::store::types::OrderStatus;
use tracing::*;

/// Every table owning module, in foreign key order.
const ALL_MIGRATIONS: [&Migrations; 7] = [
	&users::MIGRATIONS,
	&catalog::MIGRATIONS,
	&orders::MIGRATIONS,
	&wallet::MIGRATIONS,
	&coupons::MIGRATIONS,
	&discounts::MIGRATIONS,
	&messages::MIGRATIONS,
];

pub async fn migrate_all(pool: &DbPool) -> anyhow::Result<()> {
	for migrations in ALL_MIGRATIONS.iter() {
		migrations.migrate_up(pool).await?;
	}
	info!("All store migrations are applied");
	Ok(())
}

/// Why a coupon or discount code was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
	#[error("code not found")]
	NotFound,
	#[error("code is not active")]
	Inactive,
	#[error("code has no value")]
	InvalidAmount,
	#[error("code usage limit is reached")]
	UsageLimitReached,
	#[error("code has expired")]
	Expired,
	#[error("you have already used this code")]
	UserLimitReached,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("user {0} not found")]
	UserNotFound(i64),
	#[error("order #{0} not found")]
	OrderNotFound(i64),
	#[error("product {0} not found")]
	ProductNotFound(i64),
	#[error("message {0} not found")]
	MessageNotFound(i64),
	#[error("coupon {0} not found")]
	CouponNotFound(i64),
	#[error("discount {0} not found")]
	DiscountNotFound(i64),
	#[error("insufficient wallet balance: {balance} available, {required} required")]
	InsufficientBalance { balance: i64, required: i64 },
	#[error("invalid amount: {0}")]
	InvalidAmount(String),
	#[error("{0}")]
	InvalidInput(String),
	#[error("product {0} cannot be used as a parent category")]
	InvalidParent(i64),
	#[error("order #{id} is {status} and cannot be changed this way")]
	InvalidOrderState { id: i64, status: OrderStatus },
	#[error("order #{0} belongs to another user")]
	NotOwner(i64),
	#[error("another entry already uses sort position {0} here")]
	SortConflict(i64),
	#[error("the first purchase plan is not available for order #{0}")]
	FirstPlanUnavailable(i64),
	#[error("a discount is already applied to order #{0}")]
	DiscountAlreadyApplied(i64),
	#[error("order #{0} already holds wallet money, a discount must be applied before paying")]
	DiscountAfterReservation(i64),
	#[error("this discount does not apply to the ordered product")]
	DiscountNotApplicable,
	#[error("code `{0}` already exists")]
	DuplicateCode(String),
	#[error(transparent)]
	Code(#[from] CodeError),
	#[error("database error")]
	Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
	/// Errors that a person caused and can fix, as opposed to storage failures.
	pub fn is_user_facing(&self) -> bool {
		!matches!(self, StoreError::Database(_))
	}
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
	match e {
		sqlx::Error::Database(db) => db.is_unique_violation(),
		_ => false,
	}
}

/// Renders statuses as a SQL `IN` list, they are fixed identifiers so nothing needs binding.
pub(crate) fn status_sql_list(statuses: &[OrderStatus]) -> String {
	statuses
		.iter()
		.map(|s| format!("'{}'", s.as_str()))
		.collect::<Vec<_>>()
		.join(",")
}

/// Upper case and trimmed, the way coupon and discount codes are stored.
pub fn normalize_code(code: &str) -> String {
	code.trim().to_uppercase()
}
