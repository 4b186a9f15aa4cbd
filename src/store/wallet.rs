use crate::database::{Migration, Migrations};
use crate::store::types::{now, timestamp, WalletTxKind};
use crate::store::{StoreError, StoreResult};
use sqlx::{Connection, SqliteConnection};
use tracing::*;

pub(crate) const MIGRATIONS: Migrations = Migrations::new(
	"Wallet",
	&[Migration::new("Create wallet transaction ledger")
		.up(r#"
			CREATE TABLE IF NOT EXISTS wallet_tx (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				user_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
				order_id INTEGER,
				amount INTEGER NOT NULL CHECK (amount >= 0),
				kind TEXT NOT NULL,
				note TEXT,
				created_at TEXT NOT NULL
			);
			CREATE INDEX IF NOT EXISTS wallet_tx_user ON wallet_tx(user_id, created_at);
			CREATE INDEX IF NOT EXISTS wallet_tx_order ON wallet_tx(order_id);
		"#)
		.down("DROP TABLE wallet_tx;")],
);

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct WalletTx {
	pub id: i64,
	pub user_id: i64,
	pub order_id: Option<i64>,
	pub amount: i64,
	pub kind: WalletTxKind,
	pub note: Option<String>,
	pub created_at: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct WalletSummary {
	pub credit: i64,
	pub debit: i64,
	pub reserve: i64,
	pub refund: i64,
	/// Sum of every user's current balance.
	pub user_balances: i64,
}

impl WalletSummary {
	pub fn total(&self, kind: WalletTxKind) -> i64 {
		match kind {
			WalletTxKind::Credit => self.credit,
			WalletTxKind::Debit => self.debit,
			WalletTxKind::Reserve => self.reserve,
			WalletTxKind::Refund => self.refund,
		}
	}

	fn set(&mut self, kind: WalletTxKind, amount: i64) {
		match kind {
			WalletTxKind::Credit => self.credit = amount,
			WalletTxKind::Debit => self.debit = amount,
			WalletTxKind::Reserve => self.reserve = amount,
			WalletTxKind::Refund => self.refund = amount,
		}
	}
}

/// Moves `delta` in or out of a wallet and records it in the ledger, returning the new balance.
///
/// The balance never goes below zero, a change that would do so fails with
/// [`StoreError::InsufficientBalance`] and leaves nothing behind.
pub async fn change_wallet(
	conn: &mut SqliteConnection,
	user_id: i64,
	delta: i64,
	kind: WalletTxKind,
	note: &str,
	order_id: Option<i64>,
) -> StoreResult<i64> {
	let ts = timestamp(now());
	let mut tx = conn.begin().await?;
	let balance = sqlx::query_scalar::<_, i64>(
		r#"
		UPDATE users SET wallet_balance = wallet_balance + ?1, updated_at = ?2
		WHERE user_id = ?3 AND wallet_balance + ?1 >= 0
		RETURNING wallet_balance
		"#,
	)
	.bind(delta)
	.bind(&ts)
	.bind(user_id)
	.fetch_optional(&mut *tx)
	.await?;
	let balance = match balance {
		Some(balance) => balance,
		None => {
			let current = sqlx::query_scalar::<_, i64>(
				"SELECT wallet_balance FROM users WHERE user_id = ?",
			)
			.bind(user_id)
			.fetch_optional(&mut *tx)
			.await?;
			return Err(match current {
				None => StoreError::UserNotFound(user_id),
				Some(balance) => StoreError::InsufficientBalance {
					balance,
					required: -delta,
				},
			});
		}
	};
	sqlx::query(
		"INSERT INTO wallet_tx (user_id, order_id, amount, kind, note, created_at) VALUES (?, ?, ?, ?, ?, ?)",
	)
	.bind(user_id)
	.bind(order_id)
	.bind(delta.abs())
	.bind(kind)
	.bind(note)
	.bind(&ts)
	.execute(&mut *tx)
	.await?;
	tx.commit().await?;
	debug!(
		"Wallet of {} changed by {} ({}), balance is now {}",
		user_id,
		delta,
		kind.as_str(),
		balance
	);
	Ok(balance)
}

pub async fn balance(conn: &mut SqliteConnection, user_id: i64) -> StoreResult<i64> {
	sqlx::query_scalar::<_, i64>("SELECT wallet_balance FROM users WHERE user_id = ?")
		.bind(user_id)
		.fetch_optional(&mut *conn)
		.await?
		.ok_or(StoreError::UserNotFound(user_id))
}

pub async fn list_for_user(
	conn: &mut SqliteConnection,
	user_id: i64,
	limit: i64,
) -> StoreResult<Vec<WalletTx>> {
	let rows = sqlx::query_as::<_, WalletTx>(
		"SELECT * FROM wallet_tx WHERE user_id = ? ORDER BY id DESC LIMIT ?",
	)
	.bind(user_id)
	.bind(limit)
	.fetch_all(&mut *conn)
	.await?;
	Ok(rows)
}

pub async fn list_for_order(
	conn: &mut SqliteConnection,
	order_id: i64,
) -> StoreResult<Vec<WalletTx>> {
	let rows =
		sqlx::query_as::<_, WalletTx>("SELECT * FROM wallet_tx WHERE order_id = ? ORDER BY id")
			.bind(order_id)
			.fetch_all(&mut *conn)
			.await?;
	Ok(rows)
}

pub async fn recent(conn: &mut SqliteConnection, limit: i64) -> StoreResult<Vec<WalletTx>> {
	let rows = sqlx::query_as::<_, WalletTx>("SELECT * FROM wallet_tx ORDER BY id DESC LIMIT ?")
		.bind(limit)
		.fetch_all(&mut *conn)
		.await?;
	Ok(rows)
}

pub async fn summary(conn: &mut SqliteConnection) -> StoreResult<WalletSummary> {
	let mut summary = WalletSummary::default();
	let totals = sqlx::query_as::<_, (WalletTxKind, i64)>(
		"SELECT kind, COALESCE(SUM(amount), 0) FROM wallet_tx GROUP BY kind",
	)
	.fetch_all(&mut *conn)
	.await?;
	for (kind, amount) in totals {
		summary.set(kind, amount);
	}
	summary.user_balances =
		sqlx::query_scalar::<_, i64>("SELECT COALESCE(SUM(wallet_balance), 0) FROM users")
			.fetch_one(&mut *conn)
			.await?;
	Ok(summary)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::memory_pool;
	use crate::store::users::ensure_user;

	#[tokio::test]
	async fn balance_never_goes_negative() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		ensure_user(&mut conn, 1, None, Some("A")).await.unwrap();

		let balance = change_wallet(&mut conn, 1, 500, WalletTxKind::Credit, "gift", None)
			.await
			.unwrap();
		assert_eq!(balance, 500);

		let err = change_wallet(&mut conn, 1, -501, WalletTxKind::Debit, "too much", None)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			StoreError::InsufficientBalance {
				balance: 500,
				required: 501
			}
		));

		let balance = change_wallet(&mut conn, 1, -200, WalletTxKind::Debit, "order", Some(9))
			.await
			.unwrap();
		assert_eq!(balance, 300);

		let ledger = list_for_user(&mut conn, 1, 10).await.unwrap();
		assert_eq!(ledger.len(), 2, "the refused debit leaves no ledger entry");
		assert_eq!(ledger[0].amount, 200);
		assert_eq!(ledger[0].kind, WalletTxKind::Debit);
		assert_eq!(ledger[0].order_id, Some(9));
		assert_eq!(list_for_order(&mut conn, 9).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn unknown_user_is_reported() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		let err = change_wallet(&mut conn, 99, 10, WalletTxKind::Credit, "", None)
			.await
			.unwrap_err();
		assert!(matches!(err, StoreError::UserNotFound(99)));
	}

	#[tokio::test]
	async fn summary_totals_each_kind() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		ensure_user(&mut conn, 1, None, None).await.unwrap();
		ensure_user(&mut conn, 2, None, None).await.unwrap();
		change_wallet(&mut conn, 1, 1000, WalletTxKind::Credit, "", None).await.unwrap();
		change_wallet(&mut conn, 2, 400, WalletTxKind::Credit, "", None).await.unwrap();
		change_wallet(&mut conn, 1, -300, WalletTxKind::Reserve, "", Some(1)).await.unwrap();
		change_wallet(&mut conn, 1, 300, WalletTxKind::Refund, "", Some(1)).await.unwrap();

		let summary = summary(&mut conn).await.unwrap();
		assert_eq!(summary.credit, 1400);
		assert_eq!(summary.reserve, 300);
		assert_eq!(summary.refund, 300);
		assert_eq!(summary.debit, 0);
		assert_eq!(summary.user_balances, 1400);
	}
}
