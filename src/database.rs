use crate::config::DatabaseSettings;
use anyhow::bail;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Executor, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::*;

pub type DbPool = SqlitePool;
pub type DbTransaction<'a> = Transaction<'a, sqlx::Sqlite>;

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
	path: PathBuf,
	max_connections: u32,
}

impl DatabaseConfig {
	pub fn new(path: impl Into<PathBuf>, max_connections: u32) -> Self {
		Self {
			path: path.into(),
			max_connections,
		}
	}

	pub fn from_settings(settings: &DatabaseSettings) -> Self {
		Self::new(settings.path.clone(), settings.max_connections)
	}

	pub async fn create_database_pool(&self) -> anyhow::Result<DbPool> {
		info!("Opening sqlite database at {:?}", &self.path);
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() && !parent.is_dir() {
				std::fs::create_dir_all(parent)?;
			}
		}
		let options = SqliteConnectOptions::new()
			.filename(&self.path)
			.create_if_missing(true)
			.foreign_keys(true)
			.journal_mode(SqliteJournalMode::Wal)
			// The bot and the admin panel are separate processes writing the same file
			.busy_timeout(Duration::from_secs(10));

		let pool = SqlitePoolOptions::new()
			.max_connections(self.max_connections.max(1))
			.connect_with(options)
			.await?;

		migrate_migration_table(&pool).await?;

		info!("Successfully initialized the database connection pool");
		Ok(pool)
	}
}

/// A private in-memory database with every migration applied.
///
/// Limited to one connection that is never recycled, every connection to `:memory:` is a new
/// empty database otherwise.
pub async fn memory_pool() -> anyhow::Result<DbPool> {
	let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.min_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect_with(options)
		.await?;
	migrate_migration_table(&pool).await?;
	crate::store::migrate_all(&pool).await?;
	Ok(pool)
}

async fn migrate_migration_table(pool: &SqlitePool) -> anyhow::Result<()> {
	pool.execute(
		r#"
		CREATE TABLE IF NOT EXISTS _migrations (
			module TEXT NOT NULL,
			version INTEGER NOT NULL,
			checksum BLOB NOT NULL,
			description TEXT NOT NULL,
			inserted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%S', 'now')),
			PRIMARY KEY (module, version)
		);
	"#,
	)
	.await?;
	debug!("Migration table loaded");
	Ok(())
}

#[derive(Clone)]
pub struct Migration {
	pub description: &'static str,
	pub sql_up: &'static str,
	pub sql_down: &'static str,
}

pub struct Migrations {
	pub module: &'static str,
	pub migrations: &'static [Migration],
}

impl Migration {
	pub const fn new(description: &'static str) -> Self {
		Self {
			description,
			sql_up: "",
			sql_down: "",
		}
	}

	pub const fn up(self, sql_up: &'static str) -> Self {
		Self { sql_up, ..self }
	}

	pub const fn down(self, sql_down: &'static str) -> Self {
		Self { sql_down, ..self }
	}

	pub fn checksum(&self) -> Vec<u8> {
		use sha2::Digest;
		sha2::Sha512::new()
			.chain_update(self.sql_up.as_bytes())
			.chain_update(self.sql_down.as_bytes())
			.finalize()
			.to_vec()
	}

	async fn migrate_up(&self, module: &str, conn: &mut DbTransaction<'_>) -> anyhow::Result<()> {
		info!("Migrate up {}: {}", module, self.description);
		(&mut **conn).execute(self.sql_up).await?;
		Ok(())
	}
}

impl Migrations {
	pub const fn new(module: &'static str, migrations: &'static [Migration]) -> Self {
		Self { module, migrations }
	}

	pub async fn migrate_up(&self, pool: &SqlitePool) -> anyhow::Result<()> {
		if self.migrations.is_empty() {
			return Ok(());
		}
		debug!("Migrating all up on {}", self.module);
		let mut conn = pool.begin().await?;
		let mut current = sqlx::query_as::<_, (i64, Vec<u8>)>(
			"SELECT version, checksum FROM _migrations WHERE module = ? ORDER BY version DESC",
		)
		.bind(self.module)
		.fetch_all(&mut *conn)
		.await?;
		for (mig_version, mig) in self.migrations.iter().enumerate() {
			let mig_version = mig_version as i64;
			if let Some((version, checksum)) = current.pop() {
				if checksum.len() != 64 {
					bail!(
						"Migration database checksum length is invalid for module {} with version {}",
						self.module,
						version
					);
				} else if version != mig_version {
					bail!(
						"Version mismatch in {}: {} -> {}",
						self.module,
						version,
						mig_version
					);
				} else if checksum != mig.checksum() {
					bail!(
						"Checksum mismatch in {} for version {}, the migration was edited after it was applied",
						self.module,
						version
					);
				}
			} else {
				mig.migrate_up(self.module, &mut conn).await?;
				sqlx::query(
					"INSERT INTO _migrations(module, version, checksum, description) VALUES (?, ?, ?, ?)",
				)
				.bind(self.module)
				.bind(mig_version)
				.bind(mig.checksum())
				.bind(mig.description)
				.execute(&mut *conn)
				.await?;
			}
		}
		if let Some((version, _)) = current.pop() {
			bail!(
				"Database has migration {} for {} that this build does not know about",
				version,
				self.module
			);
		}
		conn.commit().await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const TEST_MIGRATIONS: Migrations = Migrations::new(
		"Test",
		&[Migration::new("Create widgets")
			.up("CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
			.down("DROP TABLE widgets;")],
	);

	const EDITED_MIGRATIONS: Migrations = Migrations::new(
		"Test",
		&[Migration::new("Create widgets")
			.up("CREATE TABLE widgets (id INTEGER PRIMARY KEY, label TEXT NOT NULL);")
			.down("DROP TABLE widgets;")],
	);

	#[tokio::test]
	async fn migrations_apply_once() {
		let pool = memory_pool().await.unwrap();
		TEST_MIGRATIONS.migrate_up(&pool).await.unwrap();
		TEST_MIGRATIONS.migrate_up(&pool).await.unwrap();
		let applied: i64 =
			sqlx::query_scalar("SELECT COUNT(*) FROM _migrations WHERE module = 'Test'")
				.fetch_one(&pool)
				.await
				.unwrap();
		assert_eq!(applied, 1);
	}

	#[tokio::test]
	async fn edited_migration_is_refused() {
		let pool = memory_pool().await.unwrap();
		TEST_MIGRATIONS.migrate_up(&pool).await.unwrap();
		let err = EDITED_MIGRATIONS.migrate_up(&pool).await.unwrap_err();
		assert!(err.to_string().contains("Checksum mismatch"));
	}
}
