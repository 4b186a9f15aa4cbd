use crate::database::{Migration, Migrations};
use crate::store::coupons::{check_user_limit, normalize_expiry, per_user_limit, random_code, CodeLimits};
use crate::store::orders::require_order;
use crate::store::types::{now, timestamp, OrderStatus};
use crate::store::{is_unique_violation, normalize_code, CodeError, StoreError, StoreResult};
use sqlx::{Connection, SqliteConnection};
use time::OffsetDateTime;
use tracing::*;

pub(crate) const MIGRATIONS: Migrations = Migrations::new(
	"Discounts",
	&[Migration::new("Create discount tables")
		.up(r#"
			CREATE TABLE IF NOT EXISTS discounts (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				code TEXT NOT NULL UNIQUE,
				amount INTEGER NOT NULL,
				usage_limit INTEGER NOT NULL DEFAULT 0,
				usage_limit_per_user INTEGER NOT NULL DEFAULT 1,
				used_count INTEGER NOT NULL DEFAULT 0,
				is_active INTEGER NOT NULL DEFAULT 1,
				applies_all INTEGER NOT NULL DEFAULT 0,
				product_ids TEXT NOT NULL DEFAULT '',
				expires_at TEXT,
				created_at TEXT NOT NULL,
				updated_at TEXT NOT NULL
			);
			CREATE TABLE IF NOT EXISTS discount_redemptions (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				discount_id INTEGER NOT NULL REFERENCES discounts(id) ON DELETE CASCADE,
				user_id INTEGER NOT NULL,
				order_id INTEGER,
				amount INTEGER NOT NULL,
				times_used INTEGER NOT NULL DEFAULT 1,
				redeemed_at TEXT NOT NULL,
				UNIQUE (discount_id, user_id)
			);
		"#)
		.down("DROP TABLE discount_redemptions; DROP TABLE discounts;")],
);

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct Discount {
	pub id: i64,
	pub code: String,
	pub amount: i64,
	pub usage_limit: i64,
	pub usage_limit_per_user: i64,
	pub used_count: i64,
	pub is_active: bool,
	pub applies_all: bool,
	/// Comma separated product ids.
	pub product_ids: String,
	pub expires_at: Option<String>,
	pub created_at: String,
	pub updated_at: String,
}

impl Discount {
	pub fn product_id_list(&self) -> Vec<i64> {
		parse_product_ids(&self.product_ids)
	}

	/// A restricted discount without any listed product applies everywhere.
	pub fn applies_to(&self, product_id: i64) -> bool {
		let listed = self.product_id_list();
		self.applies_all || listed.is_empty() || listed.contains(&product_id)
	}
}

/// Reads `1, 2,x,3` as `[1, 2, 3]`, skipping anything that is not an id.
pub fn parse_product_ids(raw: &str) -> Vec<i64> {
	raw.split(',')
		.filter_map(|part| part.trim().parse::<i64>().ok())
		.filter(|id| *id > 0)
		.collect()
}

fn join_product_ids(ids: &[i64]) -> String {
	ids.iter()
		.filter(|id| **id > 0)
		.map(i64::to_string)
		.collect::<Vec<_>>()
		.join(",")
}

#[derive(Clone, Debug, Default)]
pub struct NewDiscount {
	pub code: String,
	pub amount: i64,
	pub usage_limit: i64,
	pub usage_limit_per_user: i64,
	pub applies_all: bool,
	pub product_ids: Vec<i64>,
	pub expires_at: Option<String>,
}

pub async fn create(conn: &mut SqliteConnection, new: &NewDiscount) -> StoreResult<Discount> {
	if new.amount <= 0 {
		return Err(StoreError::InvalidAmount(new.amount.to_string()));
	}
	if new.usage_limit < 0 || new.usage_limit_per_user < 0 {
		return Err(StoreError::InvalidInput(
			"usage limits cannot be negative".to_owned(),
		));
	}
	let code = match normalize_code(&new.code) {
		code if code.is_empty() => random_code(),
		code => code,
	};
	let expires_at = normalize_expiry(new.expires_at.as_deref())?;
	let ts = timestamp(now());
	let id = sqlx::query(
		r#"
		INSERT INTO discounts (code, amount, usage_limit, usage_limit_per_user, applies_all, product_ids, expires_at, created_at, updated_at)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(&code)
	.bind(new.amount)
	.bind(new.usage_limit)
	.bind(per_user_limit(new.usage_limit_per_user))
	.bind(new.applies_all)
	.bind(join_product_ids(&new.product_ids))
	.bind(&expires_at)
	.bind(&ts)
	.bind(&ts)
	.execute(&mut *conn)
	.await
	.map_err(|e| {
		if is_unique_violation(&e) {
			StoreError::DuplicateCode(code.clone())
		} else {
			StoreError::Database(e)
		}
	})?
	.last_insert_rowid();
	info!("Discount {} created worth {}", code, new.amount);
	get(conn, id).await?.ok_or(StoreError::DiscountNotFound(id))
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> StoreResult<Option<Discount>> {
	let discount = sqlx::query_as::<_, Discount>("SELECT * FROM discounts WHERE id = ?")
		.bind(id)
		.fetch_optional(&mut *conn)
		.await?;
	Ok(discount)
}

pub async fn list(conn: &mut SqliteConnection, limit: i64, offset: i64) -> StoreResult<Vec<Discount>> {
	let discounts = sqlx::query_as::<_, Discount>(
		"SELECT * FROM discounts ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
	)
	.bind(limit)
	.bind(offset.max(0))
	.fetch_all(&mut *conn)
	.await?;
	Ok(discounts)
}

pub async fn toggle(conn: &mut SqliteConnection, id: i64) -> StoreResult<bool> {
	sqlx::query_scalar::<_, bool>(
		"UPDATE discounts SET is_active = NOT is_active, updated_at = ? WHERE id = ? RETURNING is_active",
	)
	.bind(timestamp(now()))
	.bind(id)
	.fetch_optional(&mut *conn)
	.await?
	.ok_or(StoreError::DiscountNotFound(id))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedDiscount {
	pub code: String,
	pub discount: i64,
	pub payable: i64,
}

/// Applies a discount code to an unpaid catalog order of the user.
pub async fn apply_to_order(
	conn: &mut SqliteConnection,
	order_id: i64,
	user_id: i64,
	code: &str,
	at: OffsetDateTime,
) -> StoreResult<AppliedDiscount> {
	let mut tx = conn.begin().await?;
	let order = require_order(&mut tx, order_id).await?;
	if order.user_id != user_id {
		return Err(StoreError::NotOwner(order_id));
	}
	if order.status != OrderStatus::AwaitingPayment {
		return Err(StoreError::InvalidOrderState {
			id: order_id,
			status: order.status,
		});
	}
	if order.discount_id.is_some() {
		return Err(StoreError::DiscountAlreadyApplied(order_id));
	}
	// A reservation is sized against the undiscounted payable amount
	if order.wallet_reserved_amount > 0 {
		return Err(StoreError::DiscountAfterReservation(order_id));
	}

	let code = normalize_code(code);
	if code.is_empty() {
		return Err(CodeError::NotFound.into());
	}
	let discount = sqlx::query_as::<_, Discount>("SELECT * FROM discounts WHERE code = ?")
		.bind(&code)
		.fetch_optional(&mut *tx)
		.await?
		.ok_or(CodeError::NotFound)?;
	CodeLimits {
		is_active: discount.is_active,
		amount: discount.amount,
		usage_limit: discount.usage_limit,
		used_count: discount.used_count,
		expires_at: discount.expires_at.as_deref(),
	}
	.check(at)?;
	match order.product_id() {
		Some(product_id) if discount.applies_to(product_id) => {}
		_ => return Err(StoreError::DiscountNotApplicable),
	}
	let times_used = sqlx::query_scalar::<_, i64>(
		"SELECT times_used FROM discount_redemptions WHERE discount_id = ? AND user_id = ?",
	)
	.bind(discount.id)
	.bind(user_id)
	.fetch_optional(&mut *tx)
	.await?
	.unwrap_or(0);
	check_user_limit(discount.usage_limit_per_user, times_used)?;

	let base = order.amount_total.max(0);
	let value = discount.amount.min(base);
	let ts = timestamp(at);
	sqlx::query(
		"UPDATE orders SET discount_id = ?, discount_code = ?, discount_amount = ?, updated_at = ? WHERE id = ?",
	)
	.bind(discount.id)
	.bind(&discount.code)
	.bind(value)
	.bind(&ts)
	.bind(order_id)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		r#"
		INSERT INTO discount_redemptions (discount_id, user_id, order_id, amount, times_used, redeemed_at)
		VALUES (?, ?, ?, ?, 1, ?)
		ON CONFLICT(discount_id, user_id) DO UPDATE SET
			times_used = times_used + 1,
			order_id = excluded.order_id,
			redeemed_at = excluded.redeemed_at
		"#,
	)
	.bind(discount.id)
	.bind(user_id)
	.bind(order_id)
	.bind(value)
	.bind(&ts)
	.execute(&mut *tx)
	.await?;
	sqlx::query("UPDATE discounts SET used_count = used_count + 1, updated_at = ? WHERE id = ?")
		.bind(&ts)
		.bind(discount.id)
		.execute(&mut *tx)
		.await?;
	tx.commit().await?;
	info!("Discount {} took {} off order #{}", discount.code, value, order_id);
	Ok(AppliedDiscount {
		code: discount.code,
		discount: value,
		payable: (base - value).max(0),
	})
}
