use crate::database::{Migration, Migrations};
use crate::store::types::{now, timestamp, OrderStatus, PaymentType, WalletTxKind};
use crate::store::wallet::change_wallet;
use crate::store::{status_sql_list, StoreError, StoreResult};
use sqlx::{Connection, SqliteConnection};
use time::{Duration, OffsetDateTime};
use tracing::*;

pub(crate) const MIGRATIONS: Migrations = Migrations::new(
	"Orders",
	&[Migration::new("Create orders table")
		.up(r#"
			CREATE TABLE IF NOT EXISTS orders (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
				username TEXT,
				first_name TEXT,
				plan_title TEXT NOT NULL,
				receipt_file_id TEXT,
				receipt_text TEXT,
				status TEXT NOT NULL,
				created_at TEXT NOT NULL,
				updated_at TEXT NOT NULL,
				amount_total INTEGER NOT NULL DEFAULT 0,
				currency TEXT NOT NULL,
				service_category TEXT NOT NULL,
				service_code TEXT NOT NULL,
				account_mode TEXT,
				customer_email TEXT,
				payment_type TEXT,
				wallet_used_amount INTEGER NOT NULL DEFAULT 0,
				wallet_reserved_amount INTEGER NOT NULL DEFAULT 0,
				await_deadline TEXT,
				notes TEXT,
				customer_message TEXT,
				manager_note TEXT,
				internal_cost INTEGER NOT NULL DEFAULT 0,
				net_revenue INTEGER NOT NULL DEFAULT 0,
				require_username INTEGER NOT NULL DEFAULT 0,
				require_password INTEGER NOT NULL DEFAULT 0,
				customer_username TEXT,
				customer_password TEXT,
				allow_first_plan INTEGER NOT NULL DEFAULT 0,
				cashback_percent INTEGER NOT NULL DEFAULT 0,
				cashback_applied_amount INTEGER NOT NULL DEFAULT 0,
				discount_id INTEGER,
				discount_code TEXT,
				discount_amount INTEGER NOT NULL DEFAULT 0
			);
			CREATE INDEX IF NOT EXISTS orders_user ON orders(user_id, created_at);
			CREATE INDEX IF NOT EXISTS orders_status ON orders(status, await_deadline);
		"#)
		.down("DROP TABLE orders;")],
);

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct Order {
	pub id: i64,
	pub user_id: i64,
	pub username: Option<String>,
	pub first_name: Option<String>,
	pub plan_title: String,
	pub receipt_file_id: Option<String>,
	pub receipt_text: Option<String>,
	pub status: OrderStatus,
	pub created_at: String,
	pub updated_at: String,
	pub amount_total: i64,
	pub currency: String,
	pub service_category: String,
	pub service_code: String,
	pub account_mode: Option<String>,
	pub customer_email: Option<String>,
	pub payment_type: Option<PaymentType>,
	pub wallet_used_amount: i64,
	pub wallet_reserved_amount: i64,
	pub await_deadline: Option<String>,
	pub notes: Option<String>,
	pub customer_message: Option<String>,
	pub manager_note: Option<String>,
	pub internal_cost: i64,
	pub net_revenue: i64,
	pub require_username: bool,
	pub require_password: bool,
	pub customer_username: Option<String>,
	pub customer_password: Option<String>,
	pub allow_first_plan: bool,
	pub cashback_percent: i64,
	pub cashback_applied_amount: i64,
	pub discount_id: Option<i64>,
	pub discount_code: Option<String>,
	pub discount_amount: i64,
}

impl Order {
	/// What the customer owes after any discount.
	pub fn payable(&self) -> i64 {
		(self.amount_total - self.discount_amount).max(0)
	}

	/// The part of the payable amount that is not covered by the wallet.
	pub fn card_part(&self) -> i64 {
		(self.payable() - self.wallet_reserved_amount - self.wallet_used_amount).max(0)
	}

	pub fn product_id(&self) -> Option<i64> {
		self.service_code.strip_prefix("product:")?.parse().ok()
	}

	pub fn has_receipt(&self) -> bool {
		self.receipt_file_id.is_some() || self.receipt_text.is_some()
	}
}

/// Order creation rules that come from configuration.
#[derive(Clone, Copy, Debug)]
pub struct OrderPolicy {
	pub payment_timeout: Duration,
	pub min_order_id: i64,
}

impl Default for OrderPolicy {
	fn default() -> Self {
		Self {
			payment_timeout: Duration::minutes(15),
			min_order_id: 0,
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct NewOrder {
	pub user_id: i64,
	pub username: Option<String>,
	pub first_name: Option<String>,
	pub title: String,
	pub amount_total: i64,
	pub currency: String,
	pub service_category: String,
	pub service_code: String,
	pub account_mode: Option<String>,
	pub customer_email: Option<String>,
	pub notes: Option<String>,
	pub require_username: bool,
	pub require_password: bool,
	pub customer_username: Option<String>,
	pub customer_password: Option<String>,
	pub allow_first_plan: bool,
	pub cashback_percent: i64,
	/// Zero priced orders are refused unless this is set.
	pub allow_free: bool,
}

/// Raises the id sequence so the next order gets at least `min_order_id`.
async fn ensure_order_id_floor(conn: &mut SqliteConnection, min_order_id: i64) -> StoreResult<()> {
	if min_order_id <= 1 {
		return Ok(());
	}
	let wanted = min_order_id - 1;
	let current = sqlx::query_scalar::<_, i64>(
		"SELECT MAX(COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'orders'), 0), COALESCE((SELECT MAX(id) FROM orders), 0))",
	)
	.fetch_one(&mut *conn)
	.await?;
	if current >= wanted {
		return Ok(());
	}
	let updated = sqlx::query("UPDATE sqlite_sequence SET seq = ? WHERE name = 'orders'")
		.bind(wanted)
		.execute(&mut *conn)
		.await?;
	if updated.rows_affected() == 0 {
		sqlx::query("INSERT INTO sqlite_sequence (name, seq) VALUES ('orders', ?)")
			.bind(wanted)
			.execute(&mut *conn)
			.await?;
	}
	Ok(())
}

pub async fn create_order(
	conn: &mut SqliteConnection,
	new: NewOrder,
	policy: &OrderPolicy,
	at: OffsetDateTime,
) -> StoreResult<Order> {
	if new.amount_total < 0 || (new.amount_total == 0 && !new.allow_free) {
		return Err(StoreError::InvalidAmount(new.amount_total.to_string()));
	}
	let ts = timestamp(at);
	let deadline = timestamp(at + policy.payment_timeout);
	let mut tx = conn.begin().await?;
	ensure_order_id_floor(&mut tx, policy.min_order_id).await?;
	let id = sqlx::query(
		r#"
		INSERT INTO orders (
			user_id, username, first_name, plan_title, status, created_at, updated_at,
			amount_total, currency, service_category, service_code, account_mode, customer_email,
			await_deadline, notes, require_username, require_password, customer_username,
			customer_password, allow_first_plan, cashback_percent
		) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(new.user_id)
	.bind(&new.username)
	.bind(&new.first_name)
	.bind(new.title.trim())
	.bind(OrderStatus::AwaitingPayment)
	.bind(&ts)
	.bind(&ts)
	.bind(new.amount_total)
	.bind(&new.currency)
	.bind(&new.service_category)
	.bind(&new.service_code)
	.bind(&new.account_mode)
	.bind(&new.customer_email)
	.bind(&deadline)
	.bind(&new.notes)
	.bind(new.require_username)
	.bind(new.require_password)
	.bind(&new.customer_username)
	.bind(&new.customer_password)
	.bind(new.allow_first_plan)
	.bind(new.cashback_percent.clamp(0, 100))
	.execute(&mut *tx)
	.await?
	.last_insert_rowid();
	let order = require_order(&mut tx, id).await?;
	tx.commit().await?;
	info!(
		"Order #{} created for user {}: {} ({})",
		order.id, order.user_id, order.plan_title, order.amount_total
	);
	Ok(order)
}

pub async fn get_order(conn: &mut SqliteConnection, id: i64) -> StoreResult<Option<Order>> {
	let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
		.bind(id)
		.fetch_optional(&mut *conn)
		.await?;
	Ok(order)
}

pub async fn require_order(conn: &mut SqliteConnection, id: i64) -> StoreResult<Order> {
	get_order(conn, id).await?.ok_or(StoreError::OrderNotFound(id))
}

async fn require_owned(conn: &mut SqliteConnection, id: i64, user_id: i64) -> StoreResult<Order> {
	let order = require_order(conn, id).await?;
	if order.user_id != user_id {
		return Err(StoreError::NotOwner(id));
	}
	Ok(order)
}

fn expect_status(order: &Order, allowed: &[OrderStatus]) -> StoreResult<()> {
	if allowed.contains(&order.status) {
		Ok(())
	} else {
		Err(StoreError::InvalidOrderState {
			id: order.id,
			status: order.status,
		})
	}
}

/// Changes the status, crediting any cashback the order earns once it counts as paid.
pub async fn set_status(
	conn: &mut SqliteConnection,
	id: i64,
	status: OrderStatus,
) -> StoreResult<Order> {
	let mut tx = conn.begin().await?;
	let done = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
		.bind(status)
		.bind(timestamp(now()))
		.bind(id)
		.execute(&mut *tx)
		.await?;
	if done.rows_affected() == 0 {
		return Err(StoreError::OrderNotFound(id));
	}
	if status.is_paid() {
		apply_cashback(&mut tx, id).await?;
	}
	let order = require_order(&mut tx, id).await?;
	tx.commit().await?;
	Ok(order)
}

/// Credits whatever cashback is still owed for the order, returning the credited amount.
pub async fn apply_cashback(conn: &mut SqliteConnection, id: i64) -> StoreResult<i64> {
	let order = require_order(conn, id).await?;
	if order.cashback_percent <= 0 {
		return Ok(0);
	}
	let target = order.amount_total * order.cashback_percent / 100;
	let owed = target - order.cashback_applied_amount;
	if owed <= 0 {
		return Ok(0);
	}
	change_wallet(
		conn,
		order.user_id,
		owed,
		WalletTxKind::Credit,
		&format!("CASHBACK:ORDER:{}", id),
		Some(id),
	)
	.await?;
	sqlx::query("UPDATE orders SET cashback_applied_amount = ? WHERE id = ?")
		.bind(target)
		.bind(id)
		.execute(&mut *conn)
		.await?;
	info!("Credited {} cashback to user {} for order #{}", owed, order.user_id, id);
	Ok(owed)
}

macro_rules! column_setter {
	($(#[$meta:meta])* $name:ident, $column:literal, $ty:ty) => {
		$(#[$meta])*
		pub async fn $name(conn: &mut SqliteConnection, id: i64, value: $ty) -> StoreResult<()> {
			let done = sqlx::query(concat!("UPDATE orders SET ", $column, " = ?, updated_at = ? WHERE id = ?"))
				.bind(value)
				.bind(timestamp(now()))
				.bind(id)
				.execute(&mut *conn)
				.await?;
			if done.rows_affected() == 0 {
				return Err(StoreError::OrderNotFound(id));
			}
			Ok(())
		}
	};
}

column_setter!(set_customer_message, "customer_message", Option<&str>);
column_setter!(set_payment_type, "payment_type", Option<PaymentType>);
column_setter!(set_wallet_reserved, "wallet_reserved_amount", i64);
column_setter!(set_wallet_used, "wallet_used_amount", i64);
column_setter!(
	/// The latest note from the shop to the customer, shown again on completion.
	set_manager_note,
	"manager_note",
	&str
);

pub async fn set_receipt(
	conn: &mut SqliteConnection,
	id: i64,
	file_id: Option<&str>,
	text: Option<&str>,
) -> StoreResult<()> {
	let done = sqlx::query(
		"UPDATE orders SET receipt_file_id = ?, receipt_text = ?, updated_at = ? WHERE id = ?",
	)
	.bind(file_id)
	.bind(text)
	.bind(timestamp(now()))
	.bind(id)
	.execute(&mut *conn)
	.await?;
	if done.rows_affected() == 0 {
		return Err(StoreError::OrderNotFound(id));
	}
	Ok(())
}

pub async fn set_customer_credentials(
	conn: &mut SqliteConnection,
	id: i64,
	username: Option<&str>,
	password: Option<&str>,
) -> StoreResult<()> {
	let done = sqlx::query(
		"UPDATE orders SET customer_username = ?, customer_password = ?, updated_at = ? WHERE id = ?",
	)
	.bind(username)
	.bind(password)
	.bind(timestamp(now()))
	.bind(id)
	.execute(&mut *conn)
	.await?;
	if done.rows_affected() == 0 {
		return Err(StoreError::OrderNotFound(id));
	}
	Ok(())
}

/// Records what fulfilling the order cost, net revenue is what is left of the order total.
pub async fn set_financials(conn: &mut SqliteConnection, id: i64, cost: i64) -> StoreResult<Order> {
	let order = require_order(conn, id).await?;
	let cost = cost.max(0);
	let net = (order.amount_total - cost).max(0);
	sqlx::query("UPDATE orders SET internal_cost = ?, net_revenue = ?, updated_at = ? WHERE id = ?")
		.bind(cost)
		.bind(net)
		.bind(timestamp(now()))
		.bind(id)
		.execute(&mut *conn)
		.await?;
	require_order(conn, id).await
}

pub async fn user_has_delivered_order(conn: &mut SqliteConnection, user_id: i64) -> StoreResult<bool> {
	let sql = format!(
		"SELECT EXISTS(SELECT 1 FROM orders WHERE user_id = ? AND status IN ({}))",
		status_sql_list(&OrderStatus::DONE)
	);
	let found = sqlx::query_scalar::<_, bool>(&sql)
		.bind(user_id)
		.fetch_one(&mut *conn)
		.await?;
	Ok(found)
}

/// Unpaid orders that can still be paid, soonest deadline first.
pub async fn list_cart(
	conn: &mut SqliteConnection,
	user_id: i64,
	policy: &OrderPolicy,
	at: OffsetDateTime,
) -> StoreResult<Vec<Order>> {
	// Orders without a deadline get a fresh one rather than expiring unseen
	sqlx::query(
		"UPDATE orders SET await_deadline = ? WHERE user_id = ? AND status = ? AND await_deadline IS NULL",
	)
	.bind(timestamp(at + policy.payment_timeout))
	.bind(user_id)
	.bind(OrderStatus::AwaitingPayment)
	.execute(&mut *conn)
	.await?;
	let orders = sqlx::query_as::<_, Order>(
		"SELECT * FROM orders WHERE user_id = ? AND status = ? AND await_deadline > ? ORDER BY await_deadline, id",
	)
	.bind(user_id)
	.bind(OrderStatus::AwaitingPayment)
	.bind(timestamp(at))
	.fetch_all(&mut *conn)
	.await?;
	Ok(orders)
}

#[derive(Clone, Debug)]
pub struct ExpiredOrder {
	pub order: Order,
	pub refunded: i64,
}

/// Expires unpaid orders past their deadline, returning reserved wallet money to the customer.
pub async fn expire_and_refund(
	conn: &mut SqliteConnection,
	at: OffsetDateTime,
) -> StoreResult<Vec<ExpiredOrder>> {
	let mut tx = conn.begin().await?;
	let due = sqlx::query_as::<_, Order>(
		"SELECT * FROM orders WHERE status = ? AND await_deadline IS NOT NULL AND await_deadline <= ? ORDER BY id",
	)
	.bind(OrderStatus::AwaitingPayment)
	.bind(timestamp(at))
	.fetch_all(&mut *tx)
	.await?;
	let mut expired = Vec::with_capacity(due.len());
	for order in due {
		let refunded = order.wallet_reserved_amount;
		if refunded > 0 {
			change_wallet(
				&mut tx,
				order.user_id,
				refunded,
				WalletTxKind::Refund,
				&format!("Expire order #{}", order.id),
				Some(order.id),
			)
			.await?;
		}
		sqlx::query(
			"UPDATE orders SET status = ?, wallet_reserved_amount = 0, updated_at = ? WHERE id = ?",
		)
		.bind(OrderStatus::Expired)
		.bind(timestamp(at))
		.bind(order.id)
		.execute(&mut *tx)
		.await?;
		let order = require_order(&mut tx, order.id).await?;
		expired.push(ExpiredOrder { order, refunded });
	}
	tx.commit().await?;
	if !expired.is_empty() {
		info!("Expired {} unpaid orders", expired.len());
	}
	Ok(expired)
}

/// Pays the whole order from the wallet, counting any earlier reservation towards it.
pub async fn pay_with_wallet(
	conn: &mut SqliteConnection,
	id: i64,
	user_id: i64,
	comment: Option<&str>,
) -> StoreResult<Order> {
	let mut tx = conn.begin().await?;
	let order = require_owned(&mut tx, id, user_id).await?;
	expect_status(&order, &[OrderStatus::AwaitingPayment])?;
	let debit = (order.payable() - order.wallet_reserved_amount).max(0);
	if debit > 0 {
		change_wallet(
			&mut tx,
			user_id,
			-debit,
			WalletTxKind::Debit,
			&format!("Order #{}", id),
			Some(id),
		)
		.await?;
	}
	let used = order.wallet_used_amount + order.wallet_reserved_amount + debit;
	set_wallet_used(&mut tx, id, used).await?;
	set_wallet_reserved(&mut tx, id, 0).await?;
	set_payment_type(&mut tx, id, Some(PaymentType::Wallet)).await?;
	set_customer_message(&mut tx, id, comment).await?;
	let order = set_status(&mut tx, id, OrderStatus::InProgress).await?;
	tx.commit().await?;
	info!("Order #{} paid from the wallet of user {}", id, user_id);
	Ok(order)
}

/// Holds `amount` of the wallet for the order, the rest is paid by card.
pub async fn reserve_mixed(
	conn: &mut SqliteConnection,
	id: i64,
	user_id: i64,
	amount: i64,
) -> StoreResult<Order> {
	let mut tx = conn.begin().await?;
	let order = require_owned(&mut tx, id, user_id).await?;
	expect_status(&order, &[OrderStatus::AwaitingPayment])?;
	if amount <= 0 || amount > order.payable() {
		return Err(StoreError::InvalidAmount(amount.to_string()));
	}
	if order.wallet_reserved_amount > 0 {
		change_wallet(
			&mut tx,
			user_id,
			order.wallet_reserved_amount,
			WalletTxKind::Refund,
			&format!("Release reservation for order #{}", id),
			Some(id),
		)
		.await?;
	}
	change_wallet(
		&mut tx,
		user_id,
		-amount,
		WalletTxKind::Reserve,
		&format!("Reserve for order #{}", id),
		Some(id),
	)
	.await?;
	set_wallet_reserved(&mut tx, id, amount).await?;
	set_payment_type(&mut tx, id, Some(PaymentType::Mixed)).await?;
	let order = require_order(&mut tx, id).await?;
	tx.commit().await?;
	Ok(order)
}

/// The customer sent proof of a card payment, the order waits for an admin.
pub async fn submit_receipt(
	conn: &mut SqliteConnection,
	id: i64,
	user_id: i64,
	file_id: Option<&str>,
	text: Option<&str>,
	comment: Option<&str>,
) -> StoreResult<Order> {
	let mut tx = conn.begin().await?;
	let order = require_owned(&mut tx, id, user_id).await?;
	expect_status(&order, &[OrderStatus::AwaitingPayment])?;
	let payment_type = if order.wallet_reserved_amount > 0 {
		PaymentType::Mixed
	} else {
		PaymentType::Card
	};
	set_receipt(&mut tx, id, file_id, text).await?;
	set_customer_message(&mut tx, id, comment).await?;
	set_payment_type(&mut tx, id, Some(payment_type)).await?;
	let order = set_status(&mut tx, id, OrderStatus::PendingConfirm).await?;
	tx.commit().await?;
	info!("Receipt submitted for order #{}", id);
	Ok(order)
}

/// First purchase plan: the customer pays after delivery, once, before any delivered order.
pub async fn request_first_plan(
	conn: &mut SqliteConnection,
	id: i64,
	user_id: i64,
	comment: Option<&str>,
) -> StoreResult<Order> {
	let mut tx = conn.begin().await?;
	let order = require_owned(&mut tx, id, user_id).await?;
	expect_status(&order, &[OrderStatus::AwaitingPayment])?;
	if !order.allow_first_plan || user_has_delivered_order(&mut tx, user_id).await? {
		return Err(StoreError::FirstPlanUnavailable(id));
	}
	set_payment_type(&mut tx, id, Some(PaymentType::FirstPlan)).await?;
	set_customer_message(&mut tx, id, comment).await?;
	let order = set_status(&mut tx, id, OrderStatus::PendingPlan).await?;
	tx.commit().await?;
	Ok(order)
}

/// Cancels an order that has not been approved yet, returning any reservation.
pub async fn cancel_by_user(
	conn: &mut SqliteConnection,
	id: i64,
	user_id: i64,
) -> StoreResult<ExpiredOrder> {
	let mut tx = conn.begin().await?;
	let order = require_owned(&mut tx, id, user_id).await?;
	expect_status(
		&order,
		&[OrderStatus::AwaitingPayment, OrderStatus::PendingConfirm],
	)?;
	let refunded = order.wallet_reserved_amount;
	if refunded > 0 {
		change_wallet(
			&mut tx,
			user_id,
			refunded,
			WalletTxKind::Refund,
			&format!("Cancel order #{}", id),
			Some(id),
		)
		.await?;
		set_wallet_reserved(&mut tx, id, 0).await?;
	}
	let order = set_status(&mut tx, id, OrderStatus::Canceled).await?;
	tx.commit().await?;
	info!("Order #{} canceled by its customer", id);
	Ok(ExpiredOrder { order, refunded })
}

#[derive(Clone, Debug)]
pub struct StatusChange {
	pub order: Order,
	pub previous: OrderStatus,
	pub changed: bool,
	/// Money returned to the wallet by a rejection.
	pub refunded: i64,
	pub plan_approved: bool,
}

/// Status change requested by an admin.
///
/// `APPROVED` and `PLAN_CONFIRMED` both put the order in progress, the latter only from
/// `PENDING_PLAN`. Rejecting returns every wallet amount and, when a receipt was sent, the card
/// payment as wallet credit.
pub async fn admin_set_status(
	conn: &mut SqliteConnection,
	id: i64,
	requested: OrderStatus,
) -> StoreResult<StatusChange> {
	let mut tx = conn.begin().await?;
	let order = require_order(&mut tx, id).await?;
	let previous = order.status;
	let plan_approved = requested == OrderStatus::PlanConfirmed;
	if plan_approved && previous != OrderStatus::PendingPlan {
		return Err(StoreError::InvalidOrderState {
			id,
			status: previous,
		});
	}
	let target = match requested {
		OrderStatus::Approved | OrderStatus::PlanConfirmed => OrderStatus::InProgress,
		other => other,
	};
	if target == previous {
		return Ok(StatusChange {
			order,
			previous,
			changed: false,
			refunded: 0,
			plan_approved: false,
		});
	}

	let mut refunded = 0;
	if target.is_paid() && order.wallet_reserved_amount > 0 {
		set_wallet_used(
			&mut tx,
			id,
			order.wallet_used_amount + order.wallet_reserved_amount,
		)
		.await?;
		set_wallet_reserved(&mut tx, id, 0).await?;
	} else if target == OrderStatus::Rejected {
		let note = format!("Order #{} rejected", id);
		for held in [order.wallet_reserved_amount, order.wallet_used_amount] {
			if held > 0 {
				change_wallet(&mut tx, order.user_id, held, WalletTxKind::Refund, &note, Some(id))
					.await?;
				refunded += held;
			}
		}
		set_wallet_reserved(&mut tx, id, 0).await?;
		set_wallet_used(&mut tx, id, 0).await?;

		let card_part = order.card_part();
		let card_note = format!("Order #{} card refund", id);
		let already_refunded = sqlx::query_scalar::<_, bool>(
			"SELECT EXISTS(SELECT 1 FROM wallet_tx WHERE order_id = ? AND note = ?)",
		)
		.bind(id)
		.bind(&card_note)
		.fetch_one(&mut *tx)
		.await?;
		if order.has_receipt() && card_part > 0 && !already_refunded {
			change_wallet(
				&mut tx,
				order.user_id,
				card_part,
				WalletTxKind::Credit,
				&card_note,
				Some(id),
			)
			.await?;
			refunded += card_part;
		}
	}

	let order = set_status(&mut tx, id, target).await?;
	tx.commit().await?;
	info!(
		"Order #{} moved from {} to {} by an admin",
		id,
		previous.as_str(),
		target.as_str()
	);
	Ok(StatusChange {
		order,
		previous,
		changed: true,
		refunded,
		plan_approved,
	})
}

/// Customer facing history buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryCategory {
	InProgress,
	Done,
	All,
}

impl HistoryCategory {
	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"inprog" => Some(HistoryCategory::InProgress),
			"done" => Some(HistoryCategory::Done),
			"all" => Some(HistoryCategory::All),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			HistoryCategory::InProgress => "inprog",
			HistoryCategory::Done => "done",
			HistoryCategory::All => "all",
		}
	}

	fn clause(self) -> String {
		match self {
			HistoryCategory::InProgress => {
				format!(" AND status IN ({})", status_sql_list(&OrderStatus::IN_PROGRESS))
			}
			HistoryCategory::Done => format!(" AND status IN ({})", status_sql_list(&OrderStatus::DONE)),
			HistoryCategory::All => String::new(),
		}
	}
}

pub async fn list_by_category(
	conn: &mut SqliteConnection,
	user_id: i64,
	category: HistoryCategory,
	limit: i64,
	offset: i64,
) -> StoreResult<Vec<Order>> {
	let sql = format!(
		"SELECT * FROM orders WHERE user_id = ?{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
		category.clause()
	);
	let orders = sqlx::query_as::<_, Order>(&sql)
		.bind(user_id)
		.bind(limit)
		.bind(offset.max(0))
		.fetch_all(&mut *conn)
		.await?;
	Ok(orders)
}

pub async fn count_by_category(
	conn: &mut SqliteConnection,
	user_id: i64,
	category: HistoryCategory,
) -> StoreResult<i64> {
	let sql = format!(
		"SELECT COUNT(*) FROM orders WHERE user_id = ?{}",
		category.clause()
	);
	let count = sqlx::query_scalar::<_, i64>(&sql)
		.bind(user_id)
		.fetch_one(&mut *conn)
		.await?;
	Ok(count)
}

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
	pub status: Option<OrderStatus>,
	pub user_id: Option<i64>,
	pub search: Option<String>,
}

enum FilterArg {
	Int(i64),
	Text(String),
}

impl OrderFilter {
	/// `#123` and bare digits look up an order id, other text matches names, title and email.
	fn clause(&self) -> (String, Vec<FilterArg>) {
		let mut conditions = Vec::new();
		let mut args = Vec::new();
		if let Some(status) = self.status {
			conditions.push("status = ?");
			args.push(FilterArg::Text(status.as_str().to_owned()));
		}
		if let Some(user_id) = self.user_id {
			conditions.push("user_id = ?");
			args.push(FilterArg::Int(user_id));
		}
		if let Some(term) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
			let digits = term.strip_prefix('#').unwrap_or(term);
			match digits.parse::<i64>() {
				Ok(id) if digits.chars().all(|c| c.is_ascii_digit()) => {
					conditions.push("id = ?");
					args.push(FilterArg::Int(id));
				}
				_ => {
					conditions.push(
						"(LOWER(COALESCE(username, '')) LIKE ? OR LOWER(COALESCE(first_name, '')) LIKE ? OR LOWER(plan_title) LIKE ? OR LOWER(COALESCE(customer_email, '')) LIKE ?)",
					);
					let like = format!("%{}%", term.to_lowercase());
					for _ in 0..4 {
						args.push(FilterArg::Text(like.clone()));
					}
				}
			}
		}
		if conditions.is_empty() {
			(String::new(), args)
		} else {
			(format!(" WHERE {}", conditions.join(" AND ")), args)
		}
	}
}

pub async fn list_orders(
	conn: &mut SqliteConnection,
	filter: &OrderFilter,
	limit: i64,
	offset: i64,
) -> StoreResult<Vec<Order>> {
	let (clause, args) = filter.clause();
	let sql = format!(
		"SELECT * FROM orders{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
		clause
	);
	let mut query = sqlx::query_as::<_, Order>(&sql);
	for arg in args {
		query = match arg {
			FilterArg::Int(value) => query.bind(value),
			FilterArg::Text(value) => query.bind(value),
		};
	}
	let orders = query
		.bind(limit)
		.bind(offset.max(0))
		.fetch_all(&mut *conn)
		.await?;
	Ok(orders)
}

pub async fn count_orders(conn: &mut SqliteConnection, filter: &OrderFilter) -> StoreResult<i64> {
	let (clause, args) = filter.clause();
	let sql = format!("SELECT COUNT(*) FROM orders{}", clause);
	let mut query = sqlx::query_scalar::<_, i64>(&sql);
	for arg in args {
		query = match arg {
			FilterArg::Int(value) => query.bind(value),
			FilterArg::Text(value) => query.bind(value),
		};
	}
	Ok(query.fetch_one(&mut *conn).await?)
}

pub async fn recent(conn: &mut SqliteConnection, limit: i64) -> StoreResult<Vec<Order>> {
	list_orders(conn, &OrderFilter::default(), limit, 0).await
}

pub async fn pending_confirm(conn: &mut SqliteConnection, limit: i64) -> StoreResult<Vec<Order>> {
	let filter = OrderFilter {
		status: Some(OrderStatus::PendingConfirm),
		..OrderFilter::default()
	};
	list_orders(conn, &filter, limit, 0).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::memory_pool;
	use crate::store::users::{ensure_user, require_user};
	use crate::store::discounts::{self, NewDiscount};
	use crate::store::wallet;
	use time::macros::datetime;

	const AT: OffsetDateTime = datetime!(2024-03-01 12:00:00 UTC);

	fn new_order(user_id: i64, amount: i64) -> NewOrder {
		NewOrder {
			user_id,
			username: Some("buyer".to_owned()),
			first_name: Some("Buyer".to_owned()),
			title: "Premium 3 months".to_owned(),
			amount_total: amount,
			currency: "Toman".to_owned(),
			service_category: "CATALOG".to_owned(),
			service_code: "product:1".to_owned(),
			..NewOrder::default()
		}
	}

	/// Applies a half price code to the order.
	async fn halve(conn: &mut SqliteConnection, order_id: i64, user_id: i64, amount: i64) {
		let code = NewDiscount {
			code: "HALF".to_owned(),
			amount,
			usage_limit_per_user: 1,
			applies_all: true,
			..NewDiscount::default()
		};
		discounts::create(conn, &code).await.unwrap();
		discounts::apply_to_order(conn, order_id, user_id, "HALF", AT).await.unwrap();
	}

	async fn funded_user(conn: &mut SqliteConnection, user_id: i64, balance: i64) {
		ensure_user(conn, user_id, Some("buyer"), Some("Buyer")).await.unwrap();
		if balance > 0 {
			change_wallet(conn, user_id, balance, WalletTxKind::Credit, "seed", None)
				.await
				.unwrap();
		}
	}

	#[tokio::test]
	async fn new_orders_wait_for_payment_until_the_deadline() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 0).await;
		let policy = OrderPolicy::default();
		let order = create_order(&mut conn, new_order(1, 1000), &policy, AT).await.unwrap();
		assert_eq!(order.status, OrderStatus::AwaitingPayment);
		assert_eq!(order.await_deadline.as_deref(), Some("2024-03-01T12:15:00"));

		let err = create_order(&mut conn, new_order(1, 0), &policy, AT).await.unwrap_err();
		assert!(matches!(err, StoreError::InvalidAmount(_)));
		let free = NewOrder {
			allow_free: true,
			..new_order(1, 0)
		};
		create_order(&mut conn, free, &policy, AT).await.unwrap();

		let cart = list_cart(&mut conn, 1, &policy, AT + Duration::minutes(5)).await.unwrap();
		assert_eq!(cart.len(), 2);
		let cart = list_cart(&mut conn, 1, &policy, AT + Duration::minutes(16)).await.unwrap();
		assert!(cart.is_empty());
	}

	#[tokio::test]
	async fn order_ids_start_at_the_configured_floor() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 0).await;
		let policy = OrderPolicy {
			min_order_id: 5000,
			..OrderPolicy::default()
		};
		let first = create_order(&mut conn, new_order(1, 10), &policy, AT).await.unwrap();
		let second = create_order(&mut conn, new_order(1, 10), &policy, AT).await.unwrap();
		assert_eq!(first.id, 5000);
		assert_eq!(second.id, 5001);
	}

	#[tokio::test]
	async fn expiry_refunds_reservations_once() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 800).await;
		let policy = OrderPolicy::default();
		let order = create_order(&mut conn, new_order(1, 1000), &policy, AT).await.unwrap();
		reserve_mixed(&mut conn, order.id, 1, 300).await.unwrap();
		assert_eq!(wallet::balance(&mut conn, 1).await.unwrap(), 500);

		let none = expire_and_refund(&mut conn, AT + Duration::minutes(10)).await.unwrap();
		assert!(none.is_empty());

		let expired = expire_and_refund(&mut conn, AT + Duration::minutes(15)).await.unwrap();
		assert_eq!(expired.len(), 1);
		assert_eq!(expired[0].refunded, 300);
		assert_eq!(expired[0].order.status, OrderStatus::Expired);
		assert_eq!(expired[0].order.wallet_reserved_amount, 0);
		assert_eq!(wallet::balance(&mut conn, 1).await.unwrap(), 800);

		let again = expire_and_refund(&mut conn, AT + Duration::hours(1)).await.unwrap();
		assert!(again.is_empty());
	}

	#[tokio::test]
	async fn wallet_payment_debits_and_earns_cashback() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 2000).await;
		let policy = OrderPolicy::default();
		let order = create_order(
			&mut conn,
			NewOrder {
				cashback_percent: 10,
				..new_order(1, 1500)
			},
			&policy,
			AT,
		)
		.await
		.unwrap();

		let err = pay_with_wallet(&mut conn, order.id, 2, None).await.unwrap_err();
		assert!(matches!(err, StoreError::NotOwner(_)));

		let paid = pay_with_wallet(&mut conn, order.id, 1, Some("asap")).await.unwrap();
		assert_eq!(paid.status, OrderStatus::InProgress);
		assert_eq!(paid.payment_type, Some(PaymentType::Wallet));
		assert_eq!(paid.wallet_used_amount, 1500);
		assert_eq!(paid.cashback_applied_amount, 150);
		assert_eq!(paid.customer_message.as_deref(), Some("asap"));
		assert_eq!(wallet::balance(&mut conn, 1).await.unwrap(), 2000 - 1500 + 150);

		// Cashback is only ever credited once
		set_status(&mut conn, order.id, OrderStatus::Completed).await.unwrap();
		assert_eq!(wallet::balance(&mut conn, 1).await.unwrap(), 650);

		let err = pay_with_wallet(&mut conn, order.id, 1, None).await.unwrap_err();
		assert!(matches!(err, StoreError::InvalidOrderState { .. }));
	}

	#[tokio::test]
	async fn wallet_payment_needs_enough_balance() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 100).await;
		let order = create_order(&mut conn, new_order(1, 1000), &OrderPolicy::default(), AT)
			.await
			.unwrap();
		let err = pay_with_wallet(&mut conn, order.id, 1, None).await.unwrap_err();
		assert!(matches!(err, StoreError::InsufficientBalance { .. }));
		let order = require_order(&mut conn, order.id).await.unwrap();
		assert_eq!(order.status, OrderStatus::AwaitingPayment);
		assert_eq!(order.payment_type, None);
	}

	#[tokio::test]
	async fn approving_a_mixed_payment_uses_the_reservation() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 400).await;
		let order = create_order(&mut conn, new_order(1, 1000), &OrderPolicy::default(), AT)
			.await
			.unwrap();
		let err = reserve_mixed(&mut conn, order.id, 1, 1001).await.unwrap_err();
		assert!(matches!(err, StoreError::InvalidAmount(_)));
		reserve_mixed(&mut conn, order.id, 1, 400).await.unwrap();
		let submitted = submit_receipt(&mut conn, order.id, 1, Some("file-1"), None, None)
			.await
			.unwrap();
		assert_eq!(submitted.status, OrderStatus::PendingConfirm);
		assert_eq!(submitted.payment_type, Some(PaymentType::Mixed));

		let change = admin_set_status(&mut conn, order.id, OrderStatus::Approved)
			.await
			.unwrap();
		assert!(change.changed);
		assert_eq!(change.order.status, OrderStatus::InProgress);
		assert_eq!(change.order.wallet_reserved_amount, 0);
		assert_eq!(change.order.wallet_used_amount, 400);

		let same = admin_set_status(&mut conn, order.id, OrderStatus::InProgress)
			.await
			.unwrap();
		assert!(!same.changed);
	}

	#[tokio::test]
	async fn rejecting_refunds_wallet_and_card_parts() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 300).await;
		let order = create_order(&mut conn, new_order(1, 1000), &OrderPolicy::default(), AT)
			.await
			.unwrap();
		reserve_mixed(&mut conn, order.id, 1, 300).await.unwrap();
		submit_receipt(&mut conn, order.id, 1, None, Some("paid 700 from card 1234"), None)
			.await
			.unwrap();

		let change = admin_set_status(&mut conn, order.id, OrderStatus::Rejected)
			.await
			.unwrap();
		assert_eq!(change.refunded, 1000);
		assert_eq!(change.order.status, OrderStatus::Rejected);
		assert_eq!(wallet::balance(&mut conn, 1).await.unwrap(), 1000);

		// Approving then rejecting again must not pay the card part twice
		admin_set_status(&mut conn, order.id, OrderStatus::Approved).await.unwrap();
		let again = admin_set_status(&mut conn, order.id, OrderStatus::Rejected)
			.await
			.unwrap();
		assert_eq!(again.refunded, 0);
		assert_eq!(wallet::balance(&mut conn, 1).await.unwrap(), 1000);
	}

	#[tokio::test]
	async fn rejecting_an_unpaid_order_credits_nothing() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 0).await;
		let order = create_order(&mut conn, new_order(1, 1000), &OrderPolicy::default(), AT)
			.await
			.unwrap();
		let change = admin_set_status(&mut conn, order.id, OrderStatus::Rejected)
			.await
			.unwrap();
		assert_eq!(change.refunded, 0);
		assert_eq!(require_user(&mut conn, 1).await.unwrap().wallet_balance, 0);
	}

	#[tokio::test]
	async fn first_plan_is_for_first_purchases_only() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 0).await;
		let policy = OrderPolicy::default();
		let plain = create_order(&mut conn, new_order(1, 500), &policy, AT).await.unwrap();
		assert!(matches!(
			request_first_plan(&mut conn, plain.id, 1, None).await,
			Err(StoreError::FirstPlanUnavailable(_))
		));

		let eligible = NewOrder {
			allow_first_plan: true,
			..new_order(1, 500)
		};
		let order = create_order(&mut conn, eligible.clone(), &policy, AT).await.unwrap();
		let err = admin_set_status(&mut conn, order.id, OrderStatus::PlanConfirmed)
			.await
			.unwrap_err();
		assert!(matches!(err, StoreError::InvalidOrderState { .. }));

		let pending = request_first_plan(&mut conn, order.id, 1, Some("thanks")).await.unwrap();
		assert_eq!(pending.status, OrderStatus::PendingPlan);
		let change = admin_set_status(&mut conn, order.id, OrderStatus::PlanConfirmed)
			.await
			.unwrap();
		assert!(change.plan_approved);
		assert_eq!(change.order.status, OrderStatus::InProgress);
		set_status(&mut conn, order.id, OrderStatus::Delivered).await.unwrap();

		let second = create_order(&mut conn, eligible, &policy, AT).await.unwrap();
		assert!(matches!(
			request_first_plan(&mut conn, second.id, 1, None).await,
			Err(StoreError::FirstPlanUnavailable(_))
		));
	}

	#[tokio::test]
	async fn customers_cancel_before_approval() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 500).await;
		let policy = OrderPolicy::default();
		let order = create_order(&mut conn, new_order(1, 1000), &policy, AT).await.unwrap();
		reserve_mixed(&mut conn, order.id, 1, 200).await.unwrap();
		// A second reservation replaces the first rather than stacking
		reserve_mixed(&mut conn, order.id, 1, 500).await.unwrap();
		assert_eq!(wallet::balance(&mut conn, 1).await.unwrap(), 0);

		let canceled = cancel_by_user(&mut conn, order.id, 1).await.unwrap();
		assert_eq!(canceled.refunded, 500);
		assert_eq!(canceled.order.status, OrderStatus::Canceled);
		assert_eq!(wallet::balance(&mut conn, 1).await.unwrap(), 500);
		assert!(matches!(
			cancel_by_user(&mut conn, order.id, 1).await,
			Err(StoreError::InvalidOrderState { .. })
		));
	}

	#[tokio::test]
	async fn admin_search_and_history() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 0).await;
		funded_user(&mut conn, 2, 0).await;
		let policy = OrderPolicy::default();
		let a = create_order(&mut conn, new_order(1, 100), &policy, AT).await.unwrap();
		let b = create_order(
			&mut conn,
			NewOrder {
				title: "ChatGPT Plus".to_owned(),
				customer_email: Some("me@example.com".to_owned()),
				..new_order(2, 200)
			},
			&policy,
			AT + Duration::minutes(1),
		)
		.await
		.unwrap();
		set_status(&mut conn, b.id, OrderStatus::Delivered).await.unwrap();

		let by_id = OrderFilter {
			search: Some(format!("#{}", a.id)),
			..OrderFilter::default()
		};
		assert_eq!(count_orders(&mut conn, &by_id).await.unwrap(), 1);
		let by_text = OrderFilter {
			search: Some("EXAMPLE.com".to_owned()),
			..OrderFilter::default()
		};
		assert_eq!(list_orders(&mut conn, &by_text, 10, 0).await.unwrap()[0].id, b.id);
		let delivered = OrderFilter {
			status: Some(OrderStatus::Delivered),
			user_id: Some(1),
			..OrderFilter::default()
		};
		assert_eq!(count_orders(&mut conn, &delivered).await.unwrap(), 0);

		let newest = recent(&mut conn, 10).await.unwrap();
		assert_eq!(newest[0].id, b.id);

		assert_eq!(count_by_category(&mut conn, 2, HistoryCategory::Done).await.unwrap(), 1);
		assert_eq!(count_by_category(&mut conn, 2, HistoryCategory::InProgress).await.unwrap(), 0);
		assert_eq!(list_by_category(&mut conn, 1, HistoryCategory::All, 10, 0).await.unwrap().len(), 1);
		assert!(user_has_delivered_order(&mut conn, 2).await.unwrap());
		assert!(!user_has_delivered_order(&mut conn, 1).await.unwrap());
	}

	#[tokio::test]
	async fn financials_track_net_revenue() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 0).await;
		let order = create_order(&mut conn, new_order(1, 1000), &OrderPolicy::default(), AT)
			.await
			.unwrap();
		let order = set_financials(&mut conn, order.id, 350).await.unwrap();
		assert_eq!(order.internal_cost, 350);
		assert_eq!(order.net_revenue, 650);
		let order = set_financials(&mut conn, order.id, 5000).await.unwrap();
		assert_eq!(order.net_revenue, 0);
	}

	#[tokio::test]
	async fn discounted_order_keeps_revenue_on_the_full_total() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 0).await;
		let order = create_order(&mut conn, new_order(1, 10_000), &OrderPolicy::default(), AT)
			.await
			.unwrap();
		halve(&mut conn, order.id, 1, 5000).await;

		let order = set_financials(&mut conn, order.id, 1000).await.unwrap();
		assert_eq!(order.payable(), 5000);
		assert_eq!(order.net_revenue, 9000);
	}

	#[tokio::test]
	async fn cashback_is_earned_on_the_order_total() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		funded_user(&mut conn, 1, 5000).await;
		let order = create_order(
			&mut conn,
			NewOrder {
				cashback_percent: 10,
				..new_order(1, 10_000)
			},
			&OrderPolicy::default(),
			AT,
		)
		.await
		.unwrap();
		halve(&mut conn, order.id, 1, 5000).await;

		let paid = pay_with_wallet(&mut conn, order.id, 1, None).await.unwrap();
		assert_eq!(paid.wallet_used_amount, 5000);
		assert_eq!(paid.cashback_applied_amount, 1000);
		assert_eq!(wallet::balance(&mut conn, 1).await.unwrap(), 1000);
	}
}
