use crate::database::{Migration, Migrations};
use crate::store::types::{now, timestamp, ServiceCategory};
use crate::store::{StoreError, StoreResult};
use sqlx::SqliteConnection;

pub(crate) const MIGRATIONS: Migrations = Migrations::new(
	"Messages",
	&[Migration::new("Create service and manager message tables")
		.up(r#"
			CREATE TABLE IF NOT EXISTS service_messages (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				user_id INTEGER NOT NULL,
				username TEXT,
				first_name TEXT,
				category TEXT NOT NULL,
				message_text TEXT NOT NULL,
				attachment_file_id TEXT,
				is_resolved INTEGER NOT NULL DEFAULT 0,
				created_at TEXT NOT NULL,
				updated_at TEXT NOT NULL
			);
			CREATE INDEX IF NOT EXISTS service_messages_category ON service_messages(category, created_at);
			CREATE TABLE IF NOT EXISTS service_message_replies (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				message_id INTEGER NOT NULL REFERENCES service_messages(id) ON DELETE CASCADE,
				admin_identifier TEXT NOT NULL,
				reply_text TEXT NOT NULL,
				created_at TEXT NOT NULL
			);
			CREATE INDEX IF NOT EXISTS service_message_replies_message ON service_message_replies(message_id);
			CREATE TABLE IF NOT EXISTS order_manager_messages (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				order_id INTEGER NOT NULL,
				user_id INTEGER NOT NULL,
				message_text TEXT NOT NULL,
				created_at TEXT NOT NULL
			);
			CREATE INDEX IF NOT EXISTS order_manager_messages_user ON order_manager_messages(user_id);
			CREATE TABLE IF NOT EXISTS user_manager_messages (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				user_id INTEGER NOT NULL,
				message_text TEXT NOT NULL,
				created_at TEXT NOT NULL
			);
			CREATE INDEX IF NOT EXISTS user_manager_messages_user ON user_manager_messages(user_id);
		"#)
		.down(
			"DROP TABLE user_manager_messages; DROP TABLE order_manager_messages; DROP TABLE service_message_replies; DROP TABLE service_messages;",
		)],
);

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct ServiceMessage {
	pub id: i64,
	pub user_id: i64,
	pub username: Option<String>,
	pub first_name: Option<String>,
	pub category: ServiceCategory,
	pub message_text: String,
	pub attachment_file_id: Option<String>,
	pub is_resolved: bool,
	pub created_at: String,
	pub updated_at: String,
}

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct Reply {
	pub id: i64,
	pub message_id: i64,
	pub admin_identifier: String,
	pub reply_text: String,
	pub created_at: String,
}

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct OrderManagerMessage {
	pub id: i64,
	pub order_id: i64,
	pub user_id: i64,
	pub message_text: String,
	pub created_at: String,
}

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct UserManagerMessage {
	pub id: i64,
	pub user_id: i64,
	pub message_text: String,
	pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct NewServiceMessage {
	pub user_id: i64,
	pub username: Option<String>,
	pub first_name: Option<String>,
	pub category: ServiceCategory,
	pub text: String,
	pub attachment_file_id: Option<String>,
}

pub async fn create_service_message(
	conn: &mut SqliteConnection,
	new: &NewServiceMessage,
) -> StoreResult<i64> {
	let text = new.text.trim();
	if text.is_empty() && new.attachment_file_id.is_none() {
		return Err(StoreError::InvalidInput("the message is empty".to_owned()));
	}
	let ts = timestamp(now());
	let id = sqlx::query(
		r#"
		INSERT INTO service_messages (user_id, username, first_name, category, message_text, attachment_file_id, created_at, updated_at)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(new.user_id)
	.bind(&new.username)
	.bind(&new.first_name)
	.bind(new.category)
	.bind(text)
	.bind(&new.attachment_file_id)
	.bind(&ts)
	.bind(&ts)
	.execute(&mut *conn)
	.await?
	.last_insert_rowid();
	Ok(id)
}

pub async fn list_service_messages(
	conn: &mut SqliteConnection,
	category: Option<ServiceCategory>,
	limit: i64,
	offset: i64,
) -> StoreResult<Vec<ServiceMessage>> {
	let messages = sqlx::query_as::<_, ServiceMessage>(
		r#"
		SELECT * FROM service_messages
		WHERE ?1 IS NULL OR category = ?1
		ORDER BY created_at DESC, id DESC
		LIMIT ?2 OFFSET ?3
		"#,
	)
	.bind(category)
	.bind(limit)
	.bind(offset.max(0))
	.fetch_all(&mut *conn)
	.await?;
	Ok(messages)
}

pub async fn count_service_messages(
	conn: &mut SqliteConnection,
	category: Option<ServiceCategory>,
) -> StoreResult<i64> {
	let count = sqlx::query_scalar::<_, i64>(
		"SELECT COUNT(*) FROM service_messages WHERE ?1 IS NULL OR category = ?1",
	)
	.bind(category)
	.fetch_one(&mut *conn)
	.await?;
	Ok(count)
}

pub async fn count_open(conn: &mut SqliteConnection) -> StoreResult<i64> {
	let count =
		sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM service_messages WHERE is_resolved = 0")
			.fetch_one(&mut *conn)
			.await?;
	Ok(count)
}

pub async fn get_service_message(
	conn: &mut SqliteConnection,
	id: i64,
) -> StoreResult<Option<ServiceMessage>> {
	let message = sqlx::query_as::<_, ServiceMessage>("SELECT * FROM service_messages WHERE id = ?")
		.bind(id)
		.fetch_optional(&mut *conn)
		.await?;
	Ok(message)
}

pub async fn add_reply(
	conn: &mut SqliteConnection,
	message_id: i64,
	admin_identifier: &str,
	text: &str,
) -> StoreResult<i64> {
	let text = text.trim();
	if text.is_empty() {
		return Err(StoreError::InvalidInput("the reply is empty".to_owned()));
	}
	if get_service_message(conn, message_id).await?.is_none() {
		return Err(StoreError::MessageNotFound(message_id));
	}
	let id = sqlx::query(
		"INSERT INTO service_message_replies (message_id, admin_identifier, reply_text, created_at) VALUES (?, ?, ?, ?)",
	)
	.bind(message_id)
	.bind(admin_identifier)
	.bind(text)
	.bind(timestamp(now()))
	.execute(&mut *conn)
	.await?
	.last_insert_rowid();
	Ok(id)
}

/// Newest first.
pub async fn list_replies(conn: &mut SqliteConnection, message_id: i64) -> StoreResult<Vec<Reply>> {
	let replies = sqlx::query_as::<_, Reply>(
		"SELECT * FROM service_message_replies WHERE message_id = ? ORDER BY created_at DESC, id DESC",
	)
	.bind(message_id)
	.fetch_all(&mut *conn)
	.await?;
	Ok(replies)
}

pub async fn set_resolved(conn: &mut SqliteConnection, id: i64, resolved: bool) -> StoreResult<()> {
	let done = sqlx::query("UPDATE service_messages SET is_resolved = ?, updated_at = ? WHERE id = ?")
		.bind(resolved)
		.bind(timestamp(now()))
		.bind(id)
		.execute(&mut *conn)
		.await?;
	if done.rows_affected() == 0 {
		return Err(StoreError::MessageNotFound(id));
	}
	Ok(())
}

fn non_empty(text: &str) -> StoreResult<&str> {
	match text.trim() {
		"" => Err(StoreError::InvalidInput("the message is empty".to_owned())),
		text => Ok(text),
	}
}

pub async fn add_order_manager_message(
	conn: &mut SqliteConnection,
	order_id: i64,
	user_id: i64,
	text: &str,
) -> StoreResult<i64> {
	let text = non_empty(text)?;
	let id = sqlx::query(
		"INSERT INTO order_manager_messages (order_id, user_id, message_text, created_at) VALUES (?, ?, ?, ?)",
	)
	.bind(order_id)
	.bind(user_id)
	.bind(text)
	.bind(timestamp(now()))
	.execute(&mut *conn)
	.await?
	.last_insert_rowid();
	Ok(id)
}

pub async fn add_user_manager_message(
	conn: &mut SqliteConnection,
	user_id: i64,
	text: &str,
) -> StoreResult<i64> {
	let text = non_empty(text)?;
	let id = sqlx::query(
		"INSERT INTO user_manager_messages (user_id, message_text, created_at) VALUES (?, ?, ?)",
	)
	.bind(user_id)
	.bind(text)
	.bind(timestamp(now()))
	.execute(&mut *conn)
	.await?
	.last_insert_rowid();
	Ok(id)
}

pub async fn list_order_messages_for_user(
	conn: &mut SqliteConnection,
	user_id: i64,
	limit: i64,
) -> StoreResult<Vec<OrderManagerMessage>> {
	let messages = sqlx::query_as::<_, OrderManagerMessage>(
		"SELECT * FROM order_manager_messages WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
	)
	.bind(user_id)
	.bind(limit)
	.fetch_all(&mut *conn)
	.await?;
	Ok(messages)
}

pub async fn list_order_messages(
	conn: &mut SqliteConnection,
	order_id: i64,
) -> StoreResult<Vec<OrderManagerMessage>> {
	let messages = sqlx::query_as::<_, OrderManagerMessage>(
		"SELECT * FROM order_manager_messages WHERE order_id = ? ORDER BY created_at DESC, id DESC",
	)
	.bind(order_id)
	.fetch_all(&mut *conn)
	.await?;
	Ok(messages)
}

pub async fn list_user_messages(
	conn: &mut SqliteConnection,
	user_id: i64,
	limit: i64,
) -> StoreResult<Vec<UserManagerMessage>> {
	let messages = sqlx::query_as::<_, UserManagerMessage>(
		"SELECT * FROM user_manager_messages WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
	)
	.bind(user_id)
	.bind(limit)
	.fetch_all(&mut *conn)
	.await?;
	Ok(messages)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::memory_pool;

	fn request(user_id: i64, category: ServiceCategory, text: &str) -> NewServiceMessage {
		NewServiceMessage {
			user_id,
			username: Some("asker".to_owned()),
			first_name: None,
			category,
			text: text.to_owned(),
			attachment_file_id: None,
		}
	}

	#[tokio::test]
	async fn service_messages_filter_by_category() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		create_service_message(&mut conn, &request(1, ServiceCategory::BuildBot, "A shop bot"))
			.await
			.unwrap();
		let id = create_service_message(&mut conn, &request(2, ServiceCategory::ProductRequest, "  Netflix  "))
			.await
			.unwrap();
		assert!(matches!(
			create_service_message(&mut conn, &request(2, ServiceCategory::OtherService, " ")).await,
			Err(StoreError::InvalidInput(_))
		));

		assert_eq!(count_service_messages(&mut conn, None).await.unwrap(), 2);
		let requests = list_service_messages(&mut conn, Some(ServiceCategory::ProductRequest), 10, 0)
			.await
			.unwrap();
		assert_eq!(requests.len(), 1);
		assert_eq!(requests[0].message_text, "Netflix");

		assert_eq!(count_open(&mut conn).await.unwrap(), 2);
		set_resolved(&mut conn, id, true).await.unwrap();
		assert_eq!(count_open(&mut conn).await.unwrap(), 1);
		assert!(matches!(
			set_resolved(&mut conn, 99, true).await,
			Err(StoreError::MessageNotFound(99))
		));
	}

	#[tokio::test]
	async fn replies_belong_to_existing_messages() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		let id = create_service_message(&mut conn, &request(1, ServiceCategory::OtherService, "help"))
			.await
			.unwrap();
		add_reply(&mut conn, id, "admin", "On it").await.unwrap();
		add_reply(&mut conn, id, "admin", "Done").await.unwrap();
		assert!(matches!(
			add_reply(&mut conn, 42, "admin", "lost").await,
			Err(StoreError::MessageNotFound(42))
		));
		let replies = list_replies(&mut conn, id).await.unwrap();
		assert_eq!(replies.len(), 2);
		assert_eq!(replies[0].reply_text, "Done");
	}

	#[tokio::test]
	async fn manager_messages_are_listed_per_user() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		add_order_manager_message(&mut conn, 10, 1, "Your account is ready").await.unwrap();
		add_user_manager_message(&mut conn, 1, "Welcome back").await.unwrap();
		add_user_manager_message(&mut conn, 2, "Hello").await.unwrap();
		assert!(add_user_manager_message(&mut conn, 1, "").await.is_err());

		assert_eq!(list_order_messages_for_user(&mut conn, 1, 10).await.unwrap().len(), 1);
		assert_eq!(list_order_messages(&mut conn, 10).await.unwrap().len(), 1);
		let direct = list_user_messages(&mut conn, 1, 10).await.unwrap();
		assert_eq!(direct.len(), 1);
		assert_eq!(direct[0].message_text, "Welcome back");
	}
}
