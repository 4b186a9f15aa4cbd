use crate::store::messages::count_open;
use crate::store::types::{timestamp, OrderStatus, WalletTxKind};
use crate::store::wallet::summary;
use crate::store::{status_sql_list, StoreResult};
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct DashboardSnapshot {
	pub orders_total: i64,
	pub users_total: i64,
	pub awaiting_payment: i64,
	pub pending_confirm: i64,
	pub in_queue: i64,
	pub delivered: i64,
	pub revenue_total: i64,
	pub revenue_30_days: i64,
	pub new_orders_week: i64,
	/// Keyed by the ledger kind name.
	pub wallet_totals: BTreeMap<&'static str, i64>,
	/// Keyed by status name, every status present even at zero.
	pub status_counts: BTreeMap<&'static str, i64>,
	pub messages_open: i64,
}

impl DashboardSnapshot {
	fn status(&self, status: OrderStatus) -> i64 {
		self.status_counts.get(status.as_str()).copied().unwrap_or(0)
	}
}

pub async fn dashboard_snapshot(
	conn: &mut SqliteConnection,
	at: OffsetDateTime,
) -> StoreResult<DashboardSnapshot> {
	let mut snapshot = DashboardSnapshot {
		status_counts: OrderStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect(),
		..DashboardSnapshot::default()
	};

	let counts = sqlx::query_as::<_, (OrderStatus, i64)>(
		"SELECT status, COUNT(*) FROM orders GROUP BY status",
	)
	.fetch_all(&mut *conn)
	.await?;
	for (status, count) in counts {
		snapshot.status_counts.insert(status.as_str(), count);
		snapshot.orders_total += count;
	}
	snapshot.awaiting_payment = snapshot.status(OrderStatus::AwaitingPayment);
	snapshot.pending_confirm = snapshot.status(OrderStatus::PendingConfirm);
	snapshot.in_queue = [
		OrderStatus::Approved,
		OrderStatus::InProgress,
		OrderStatus::ReadyToDeliver,
	]
	.iter()
	.map(|s| snapshot.status(*s))
	.sum();
	snapshot.delivered = OrderStatus::DONE.iter().map(|s| snapshot.status(*s)).sum();

	snapshot.users_total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
		.fetch_one(&mut *conn)
		.await?;

	let revenue_sql = format!(
		"SELECT COALESCE(SUM(amount_total), 0) FROM orders WHERE status IN ({}) AND created_at >= ?",
		status_sql_list(&OrderStatus::REVENUE)
	);
	snapshot.revenue_total = sqlx::query_scalar::<_, i64>(&revenue_sql)
		.bind("")
		.fetch_one(&mut *conn)
		.await?;
	snapshot.revenue_30_days = sqlx::query_scalar::<_, i64>(&revenue_sql)
		.bind(timestamp(at - Duration::days(30)))
		.fetch_one(&mut *conn)
		.await?;
	snapshot.new_orders_week =
		sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE created_at >= ?")
			.bind(timestamp(at - Duration::days(7)))
			.fetch_one(&mut *conn)
			.await?;

	let wallet = summary(conn).await?;
	snapshot.wallet_totals = WalletTxKind::ALL
		.iter()
		.map(|kind| (kind.as_str(), wallet.total(*kind)))
		.collect();
	snapshot.messages_open = count_open(conn).await?;
	Ok(snapshot)
}
