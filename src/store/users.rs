use crate::database::{Migration, Migrations};
use crate::store::types::{now, timestamp, OrderStatus};
use crate::store::{status_sql_list, StoreError, StoreResult};
use sqlx::SqliteConnection;

pub(crate) const MIGRATIONS: Migrations = Migrations::new(
	"Users",
	&[Migration::new("Create users table")
		.up(r#"
			CREATE TABLE IF NOT EXISTS users (
				user_id INTEGER PRIMARY KEY,
				username TEXT,
				first_name TEXT,
				wallet_balance INTEGER NOT NULL DEFAULT 0 CHECK (wallet_balance >= 0),
				ref_by INTEGER,
				ref_count INTEGER NOT NULL DEFAULT 0,
				earnings_total INTEGER NOT NULL DEFAULT 0,
				contact_phone TEXT,
				contact_verified INTEGER NOT NULL DEFAULT 0,
				contact_shared_at TEXT,
				is_blocked INTEGER NOT NULL DEFAULT 0,
				created_at TEXT NOT NULL,
				updated_at TEXT NOT NULL
			);
			CREATE INDEX IF NOT EXISTS users_created_at ON users(created_at);
		"#)
		.down("DROP TABLE users;")],
);

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct User {
	pub user_id: i64,
	pub username: Option<String>,
	pub first_name: Option<String>,
	pub wallet_balance: i64,
	pub ref_by: Option<i64>,
	pub ref_count: i64,
	pub earnings_total: i64,
	pub contact_phone: Option<String>,
	pub contact_verified: bool,
	pub contact_shared_at: Option<String>,
	pub is_blocked: bool,
	pub created_at: String,
	pub updated_at: String,
}

impl User {
	/// `@username` when there is one, otherwise the first name or the numeric id.
	pub fn display_name(&self) -> String {
		match (&self.username, &self.first_name) {
			(Some(username), _) if !username.is_empty() => format!("@{}", username),
			(_, Some(first_name)) if !first_name.is_empty() => first_name.clone(),
			_ => self.user_id.to_string(),
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct UserStats {
	pub wallet_balance: i64,
	pub ref_count: i64,
	pub earnings_total: i64,
	pub orders_total: i64,
	pub orders_in_progress: i64,
	pub orders_done: i64,
}

/// Creates the user on first contact, or refreshes the Telegram names on later ones.
pub async fn ensure_user(
	conn: &mut SqliteConnection,
	user_id: i64,
	username: Option<&str>,
	first_name: Option<&str>,
) -> StoreResult<()> {
	let ts = timestamp(now());
	sqlx::query(
		r#"
		INSERT INTO users (user_id, username, first_name, created_at, updated_at)
		VALUES (?1, ?2, ?3, ?4, ?4)
		ON CONFLICT(user_id) DO UPDATE SET
			username = excluded.username,
			first_name = excluded.first_name,
			updated_at = excluded.updated_at
		"#,
	)
	.bind(user_id)
	.bind(username)
	.bind(first_name)
	.bind(&ts)
	.execute(&mut *conn)
	.await?;
	Ok(())
}

pub async fn get_user(conn: &mut SqliteConnection, user_id: i64) -> StoreResult<Option<User>> {
	let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = ?")
		.bind(user_id)
		.fetch_optional(&mut *conn)
		.await?;
	Ok(user)
}

pub async fn require_user(conn: &mut SqliteConnection, user_id: i64) -> StoreResult<User> {
	get_user(conn, user_id)
		.await?
		.ok_or(StoreError::UserNotFound(user_id))
}

pub async fn set_contact_verified(
	conn: &mut SqliteConnection,
	user_id: i64,
	phone: &str,
) -> StoreResult<()> {
	let ts = timestamp(now());
	let done = sqlx::query(
		"UPDATE users SET contact_phone = ?, contact_verified = 1, contact_shared_at = ?, updated_at = ? WHERE user_id = ?",
	)
	.bind(phone)
	.bind(&ts)
	.bind(&ts)
	.bind(user_id)
	.execute(&mut *conn)
	.await?;
	if done.rows_affected() == 0 {
		return Err(StoreError::UserNotFound(user_id));
	}
	Ok(())
}

pub async fn is_contact_verified(conn: &mut SqliteConnection, user_id: i64) -> StoreResult<bool> {
	let verified = sqlx::query_scalar::<_, bool>(
		"SELECT contact_verified FROM users WHERE user_id = ?",
	)
	.bind(user_id)
	.fetch_optional(&mut *conn)
	.await?;
	Ok(verified.unwrap_or(false))
}

pub async fn set_blocked(
	conn: &mut SqliteConnection,
	user_id: i64,
	blocked: bool,
) -> StoreResult<()> {
	let done = sqlx::query("UPDATE users SET is_blocked = ?, updated_at = ? WHERE user_id = ?")
		.bind(blocked)
		.bind(timestamp(now()))
		.bind(user_id)
		.execute(&mut *conn)
		.await?;
	if done.rows_affected() == 0 {
		return Err(StoreError::UserNotFound(user_id));
	}
	Ok(())
}

pub async fn is_blocked(conn: &mut SqliteConnection, user_id: i64) -> StoreResult<bool> {
	let blocked =
		sqlx::query_scalar::<_, bool>("SELECT is_blocked FROM users WHERE user_id = ?")
			.bind(user_id)
			.fetch_optional(&mut *conn)
			.await?;
	Ok(blocked.unwrap_or(false))
}

/// Digits match the user id as well as the names, anything else only the names.
fn search_clause(search: Option<&str>) -> (String, Vec<String>) {
	match search.map(str::trim).filter(|s| !s.is_empty()) {
		None => (String::new(), Vec::new()),
		Some(term) => {
			let like = format!("%{}%", term.to_lowercase());
			if term.chars().all(|c| c.is_ascii_digit()) {
				(
					" WHERE (CAST(user_id AS TEXT) = ? OR LOWER(COALESCE(username, '')) LIKE ? OR LOWER(COALESCE(first_name, '')) LIKE ?)".to_owned(),
					vec![term.to_owned(), like.clone(), like],
				)
			} else {
				(
					" WHERE (LOWER(COALESCE(username, '')) LIKE ? OR LOWER(COALESCE(first_name, '')) LIKE ?)".to_owned(),
					vec![like.clone(), like],
				)
			}
		}
	}
}

pub async fn list_users(
	conn: &mut SqliteConnection,
	search: Option<&str>,
	limit: i64,
	offset: i64,
) -> StoreResult<Vec<User>> {
	let (clause, args) = search_clause(search);
	let sql = format!(
		"SELECT * FROM users{} ORDER BY created_at DESC, user_id DESC LIMIT ? OFFSET ?",
		clause
	);
	let mut query = sqlx::query_as::<_, User>(&sql);
	for arg in args {
		query = query.bind(arg);
	}
	let users = query
		.bind(limit)
		.bind(offset.max(0))
		.fetch_all(&mut *conn)
		.await?;
	Ok(users)
}

pub async fn count_users(conn: &mut SqliteConnection, search: Option<&str>) -> StoreResult<i64> {
	let (clause, args) = search_clause(search);
	let sql = format!("SELECT COUNT(*) FROM users{}", clause);
	let mut query = sqlx::query_scalar::<_, i64>(&sql);
	for arg in args {
		query = query.bind(arg);
	}
	Ok(query.fetch_one(&mut *conn).await?)
}

pub async fn recent_users(conn: &mut SqliteConnection, limit: i64) -> StoreResult<Vec<User>> {
	list_users(conn, None, limit, 0).await
}

pub async fn user_stats(conn: &mut SqliteConnection, user_id: i64) -> StoreResult<UserStats> {
	let user = match get_user(conn, user_id).await? {
		Some(user) => user,
		None => return Ok(UserStats::default()),
	};
	let sql = format!(
		r#"
		SELECT
			COUNT(*),
			COALESCE(SUM(CASE WHEN status IN ({}) THEN 1 ELSE 0 END), 0),
			COALESCE(SUM(CASE WHEN status IN ({}) THEN 1 ELSE 0 END), 0)
		FROM orders WHERE user_id = ?
		"#,
		status_sql_list(&OrderStatus::IN_PROGRESS),
		status_sql_list(&OrderStatus::DONE),
	);
	let (orders_total, orders_in_progress, orders_done) =
		sqlx::query_as::<_, (i64, i64, i64)>(&sql)
			.bind(user_id)
			.fetch_one(&mut *conn)
			.await?;
	Ok(UserStats {
		wallet_balance: user.wallet_balance,
		ref_count: user.ref_count,
		earnings_total: user.earnings_total,
		orders_total,
		orders_in_progress,
		orders_done,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::memory_pool;

	#[tokio::test]
	async fn ensure_user_refreshes_names() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		ensure_user(&mut conn, 42, Some("old"), Some("Ann")).await.unwrap();
		ensure_user(&mut conn, 42, Some("new"), Some("Ann")).await.unwrap();
		let user = require_user(&mut conn, 42).await.unwrap();
		assert_eq!(user.username.as_deref(), Some("new"));
		assert_eq!(user.wallet_balance, 0);
		assert!(!user.is_blocked);
		assert_eq!(user.display_name(), "@new");
	}

	#[tokio::test]
	async fn blocking_unknown_user_fails() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		assert!(matches!(
			set_blocked(&mut conn, 7, true).await,
			Err(StoreError::UserNotFound(7))
		));
		ensure_user(&mut conn, 7, None, Some("Bo")).await.unwrap();
		set_blocked(&mut conn, 7, true).await.unwrap();
		assert!(is_blocked(&mut conn, 7).await.unwrap());
		assert!(!is_blocked(&mut conn, 8).await.unwrap());
	}

	#[tokio::test]
	async fn search_matches_ids_and_names() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		ensure_user(&mut conn, 1001, Some("alice"), Some("Alice")).await.unwrap();
		ensure_user(&mut conn, 1002, Some("bob"), Some("Bob")).await.unwrap();
		ensure_user(&mut conn, 1003, None, Some("Carol 1001")).await.unwrap();

		assert_eq!(count_users(&mut conn, None).await.unwrap(), 3);
		assert_eq!(count_users(&mut conn, Some("ALI")).await.unwrap(), 1);
		let by_id = list_users(&mut conn, Some("1001"), 10, 0).await.unwrap();
		let ids: Vec<i64> = by_id.iter().map(|u| u.user_id).collect();
		assert_eq!(ids.len(), 2);
		assert!(ids.contains(&1001) && ids.contains(&1003));
	}

	#[tokio::test]
	async fn contact_verification_is_recorded() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		ensure_user(&mut conn, 5, None, None).await.unwrap();
		assert!(!is_contact_verified(&mut conn, 5).await.unwrap());
		set_contact_verified(&mut conn, 5, "+989121234567").await.unwrap();
		assert!(is_contact_verified(&mut conn, 5).await.unwrap());
		let user = require_user(&mut conn, 5).await.unwrap();
		assert_eq!(user.contact_phone.as_deref(), Some("+989121234567"));
		assert_eq!(user.display_name(), "5");
	}
}
