use crate::database::{Migration, Migrations};
use crate::store::types::{now, parse_timestamp, timestamp, WalletTxKind};
use crate::store::wallet::change_wallet;
use crate::store::{is_unique_violation, normalize_code, CodeError, StoreError, StoreResult};
use rand::distributions::{Alphanumeric, DistString};
use sqlx::{Connection, SqliteConnection};
use time::OffsetDateTime;
use tracing::*;

pub(crate) const MIGRATIONS: Migrations = Migrations::new(
	"Coupons",
	&[Migration::new("Create coupon tables")
		.up(r#"
			CREATE TABLE IF NOT EXISTS coupons (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				code TEXT NOT NULL UNIQUE,
				amount INTEGER NOT NULL,
				usage_limit INTEGER NOT NULL DEFAULT 0,
				usage_limit_per_user INTEGER NOT NULL DEFAULT 1,
				used_count INTEGER NOT NULL DEFAULT 0,
				is_active INTEGER NOT NULL DEFAULT 1,
				expires_at TEXT,
				created_at TEXT NOT NULL,
				updated_at TEXT NOT NULL
			);
			CREATE TABLE IF NOT EXISTS coupon_redemptions (
				id INTEGER PRIMARY KEY AUTOINCREMENT,
				coupon_id INTEGER NOT NULL REFERENCES coupons(id) ON DELETE CASCADE,
				user_id INTEGER NOT NULL,
				amount INTEGER NOT NULL,
				times_used INTEGER NOT NULL DEFAULT 1,
				redeemed_at TEXT NOT NULL,
				UNIQUE (coupon_id, user_id)
			);
		"#)
		.down("DROP TABLE coupon_redemptions; DROP TABLE coupons;")],
);

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize)]
pub struct Coupon {
	pub id: i64,
	pub code: String,
	pub amount: i64,
	/// Zero means unlimited.
	pub usage_limit: i64,
	/// Zero means unlimited.
	pub usage_limit_per_user: i64,
	pub used_count: i64,
	pub is_active: bool,
	pub expires_at: Option<String>,
	pub created_at: String,
	pub updated_at: String,
}

/// The fields coupons and discounts share when deciding whether a code can be used.
pub(crate) struct CodeLimits<'a> {
	pub is_active: bool,
	pub amount: i64,
	pub usage_limit: i64,
	pub used_count: i64,
	pub expires_at: Option<&'a str>,
}

impl CodeLimits<'_> {
	/// Checks are made in a fixed order so the reported reason is stable.
	pub(crate) fn check(&self, at: OffsetDateTime) -> Result<(), CodeError> {
		if !self.is_active {
			return Err(CodeError::Inactive);
		}
		if self.amount <= 0 {
			return Err(CodeError::InvalidAmount);
		}
		if self.usage_limit > 0 && self.used_count >= self.usage_limit {
			return Err(CodeError::UsageLimitReached);
		}
		// An unparseable expiry never blocks a code
		if let Some(expires) = self.expires_at.and_then(parse_timestamp) {
			if at > expires {
				return Err(CodeError::Expired);
			}
		}
		Ok(())
	}
}

/// Every code is limited per user, a stored zero counts as a single use.
pub(crate) fn per_user_limit(stored: i64) -> i64 {
	stored.max(1)
}

pub(crate) fn check_user_limit(per_user_limit_stored: i64, times_used: i64) -> Result<(), CodeError> {
	if times_used >= per_user_limit(per_user_limit_stored) {
		Err(CodeError::UserLimitReached)
	} else {
		Ok(())
	}
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM` and full timestamps; a bare date lasts the whole day.
pub fn normalize_expiry(input: Option<&str>) -> StoreResult<Option<String>> {
	let value = match input.map(str::trim).filter(|s| !s.is_empty()) {
		None => return Ok(None),
		Some(value) => value.replace(' ', "T"),
	};
	let candidate = match value.len() {
		10 => format!("{}T23:59:59", value),
		16 => format!("{}:00", value),
		_ => value,
	};
	match parse_timestamp(&candidate) {
		Some(at) => Ok(Some(timestamp(at))),
		None => Err(StoreError::InvalidInput(format!(
			"`{}` is not a valid expiry date",
			candidate
		))),
	}
}

pub fn random_code() -> String {
	Alphanumeric
		.sample_string(&mut rand::thread_rng(), 8)
		.to_uppercase()
}

#[derive(Clone, Debug, Default)]
pub struct NewCoupon {
	/// Left empty a random code is generated.
	pub code: String,
	pub amount: i64,
	pub usage_limit: i64,
	pub usage_limit_per_user: i64,
	pub expires_at: Option<String>,
	pub is_active: bool,
}

impl NewCoupon {
	fn validated(&self) -> StoreResult<(String, Option<String>)> {
		if self.amount <= 0 {
			return Err(StoreError::InvalidAmount(self.amount.to_string()));
		}
		if self.usage_limit < 0 || self.usage_limit_per_user < 0 {
			return Err(StoreError::InvalidInput(
				"usage limits cannot be negative".to_owned(),
			));
		}
		let code = match normalize_code(&self.code) {
			code if code.is_empty() => random_code(),
			code => code,
		};
		Ok((code, normalize_expiry(self.expires_at.as_deref())?))
	}
}

fn map_duplicate(e: sqlx::Error, code: &str) -> StoreError {
	if is_unique_violation(&e) {
		StoreError::DuplicateCode(code.to_owned())
	} else {
		StoreError::Database(e)
	}
}

pub async fn create(conn: &mut SqliteConnection, new: &NewCoupon) -> StoreResult<Coupon> {
	let (code, expires_at) = new.validated()?;
	let ts = timestamp(now());
	let id = sqlx::query(
		r#"
		INSERT INTO coupons (code, amount, usage_limit, usage_limit_per_user, is_active, expires_at, created_at, updated_at)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(&code)
	.bind(new.amount)
	.bind(new.usage_limit)
	.bind(per_user_limit(new.usage_limit_per_user))
	.bind(new.is_active)
	.bind(&expires_at)
	.bind(&ts)
	.bind(&ts)
	.execute(&mut *conn)
	.await
	.map_err(|e| map_duplicate(e, &code))?
	.last_insert_rowid();
	info!("Coupon {} created worth {}", code, new.amount);
	require(conn, id).await
}

pub async fn update(conn: &mut SqliteConnection, id: i64, new: &NewCoupon) -> StoreResult<Coupon> {
	let (code, expires_at) = new.validated()?;
	let done = sqlx::query(
		r#"
		UPDATE coupons SET code = ?, amount = ?, usage_limit = ?, usage_limit_per_user = ?,
			is_active = ?, expires_at = ?, updated_at = ?
		WHERE id = ?
		"#,
	)
	.bind(&code)
	.bind(new.amount)
	.bind(new.usage_limit)
	.bind(per_user_limit(new.usage_limit_per_user))
	.bind(new.is_active)
	.bind(&expires_at)
	.bind(timestamp(now()))
	.bind(id)
	.execute(&mut *conn)
	.await
	.map_err(|e| map_duplicate(e, &code))?;
	if done.rows_affected() == 0 {
		return Err(StoreError::CouponNotFound(id));
	}
	require(conn, id).await
}

/// Flips the active flag, returning the new state.
pub async fn toggle(conn: &mut SqliteConnection, id: i64) -> StoreResult<bool> {
	sqlx::query_scalar::<_, bool>(
		"UPDATE coupons SET is_active = NOT is_active, updated_at = ? WHERE id = ? RETURNING is_active",
	)
	.bind(timestamp(now()))
	.bind(id)
	.fetch_optional(&mut *conn)
	.await?
	.ok_or(StoreError::CouponNotFound(id))
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> StoreResult<Option<Coupon>> {
	let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE id = ?")
		.bind(id)
		.fetch_optional(&mut *conn)
		.await?;
	Ok(coupon)
}

async fn require(conn: &mut SqliteConnection, id: i64) -> StoreResult<Coupon> {
	get(conn, id).await?.ok_or(StoreError::CouponNotFound(id))
}

pub async fn list(conn: &mut SqliteConnection, limit: i64, offset: i64) -> StoreResult<Vec<Coupon>> {
	let coupons = sqlx::query_as::<_, Coupon>(
		"SELECT * FROM coupons ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
	)
	.bind(limit)
	.bind(offset.max(0))
	.fetch_all(&mut *conn)
	.await?;
	Ok(coupons)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redemption {
	pub amount: i64,
	pub balance: i64,
	pub code: String,
}

/// Credits the coupon's value to the user's wallet.
pub async fn redeem(
	conn: &mut SqliteConnection,
	user_id: i64,
	code: &str,
	at: OffsetDateTime,
) -> StoreResult<Redemption> {
	let code = normalize_code(code);
	if code.is_empty() {
		return Err(CodeError::NotFound.into());
	}
	let mut tx = conn.begin().await?;
	let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = ?")
		.bind(&code)
		.fetch_optional(&mut *tx)
		.await?
		.ok_or(CodeError::NotFound)?;
	CodeLimits {
		is_active: coupon.is_active,
		amount: coupon.amount,
		usage_limit: coupon.usage_limit,
		used_count: coupon.used_count,
		expires_at: coupon.expires_at.as_deref(),
	}
	.check(at)?;
	let times_used = sqlx::query_scalar::<_, i64>(
		"SELECT times_used FROM coupon_redemptions WHERE coupon_id = ? AND user_id = ?",
	)
	.bind(coupon.id)
	.bind(user_id)
	.fetch_optional(&mut *tx)
	.await?
	.unwrap_or(0);
	check_user_limit(coupon.usage_limit_per_user, times_used)?;

	let balance = change_wallet(
		&mut tx,
		user_id,
		coupon.amount,
		WalletTxKind::Credit,
		&format!("COUPON:{}", coupon.code),
		None,
	)
	.await?;
	let ts = timestamp(at);
	sqlx::query(
		r#"
		INSERT INTO coupon_redemptions (coupon_id, user_id, amount, times_used, redeemed_at)
		VALUES (?, ?, ?, 1, ?)
		ON CONFLICT(coupon_id, user_id) DO UPDATE SET
			times_used = times_used + 1,
			redeemed_at = excluded.redeemed_at
		"#,
	)
	.bind(coupon.id)
	.bind(user_id)
	.bind(coupon.amount)
	.bind(&ts)
	.execute(&mut *tx)
	.await?;
	sqlx::query("UPDATE coupons SET used_count = used_count + 1, updated_at = ? WHERE id = ?")
		.bind(&ts)
		.bind(coupon.id)
		.execute(&mut *tx)
		.await?;
	tx.commit().await?;
	info!("User {} redeemed coupon {} for {}", user_id, coupon.code, coupon.amount);
	Ok(Redemption {
		amount: coupon.amount,
		balance,
		code: coupon.code,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::memory_pool;
	use crate::store::users::ensure_user;
	use time::macros::datetime;

	const AT: OffsetDateTime = datetime!(2024-06-01 10:00:00 UTC);

	fn coupon(code: &str, amount: i64) -> NewCoupon {
		NewCoupon {
			code: code.to_owned(),
			amount,
			usage_limit: 0,
			usage_limit_per_user: 1,
			expires_at: None,
			is_active: true,
		}
	}

	#[tokio::test]
	async fn redeeming_credits_the_wallet_once_per_user() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		ensure_user(&mut conn, 1, None, None).await.unwrap();
		create(&mut conn, &coupon(" welcome ", 5000)).await.unwrap();

		let redeemed = redeem(&mut conn, 1, "Welcome", AT).await.unwrap();
		assert_eq!(
			redeemed,
			Redemption {
				amount: 5000,
				balance: 5000,
				code: "WELCOME".to_owned()
			}
		);
		let err = redeem(&mut conn, 1, "WELCOME", AT).await.unwrap_err();
		assert!(matches!(err, StoreError::Code(CodeError::UserLimitReached)));

		let ledger = crate::store::wallet::list_for_user(&mut conn, 1, 5).await.unwrap();
		assert_eq!(ledger.len(), 1);
		assert_eq!(ledger[0].note.as_deref(), Some("COUPON:WELCOME"));
	}

	#[tokio::test]
	async fn zero_per_user_limit_still_allows_one_redemption() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		ensure_user(&mut conn, 1, None, None).await.unwrap();
		let created = create(
			&mut conn,
			&NewCoupon {
				usage_limit_per_user: 0,
				..coupon("GIFT", 100)
			},
		)
		.await
		.unwrap();
		assert_eq!(created.usage_limit_per_user, 1);

		// Rows written before the limit was enforced may still hold zero
		sqlx::query("UPDATE coupons SET usage_limit_per_user = 0 WHERE id = ?")
			.bind(created.id)
			.execute(&mut *conn)
			.await
			.unwrap();

		redeem(&mut conn, 1, "GIFT", AT).await.unwrap();
		let err = redeem(&mut conn, 1, "GIFT", AT).await.unwrap_err();
		assert!(matches!(err, StoreError::Code(CodeError::UserLimitReached)));
		assert_eq!(
			crate::store::wallet::list_for_user(&mut conn, 1, 5).await.unwrap().len(),
			1
		);
	}

	#[tokio::test]
	async fn checks_are_reported_in_order() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		ensure_user(&mut conn, 1, None, None).await.unwrap();
		ensure_user(&mut conn, 2, None, None).await.unwrap();

		let err = redeem(&mut conn, 1, "NOPE", AT).await.unwrap_err();
		assert!(matches!(err, StoreError::Code(CodeError::NotFound)));

		let off = create(
			&mut conn,
			&NewCoupon {
				is_active: false,
				..coupon("OFF", 10)
			},
		)
		.await
		.unwrap();
		let err = redeem(&mut conn, 1, "off", AT).await.unwrap_err();
		assert!(matches!(err, StoreError::Code(CodeError::Inactive)));
		assert!(toggle(&mut conn, off.id).await.unwrap());
		redeem(&mut conn, 1, "off", AT).await.unwrap();

		create(
			&mut conn,
			&NewCoupon {
				usage_limit: 1,
				..coupon("ONCE", 10)
			},
		)
		.await
		.unwrap();
		redeem(&mut conn, 1, "ONCE", AT).await.unwrap();
		let err = redeem(&mut conn, 2, "ONCE", AT).await.unwrap_err();
		assert!(matches!(err, StoreError::Code(CodeError::UsageLimitReached)));

		create(
			&mut conn,
			&NewCoupon {
				expires_at: Some("2024-05-31".to_owned()),
				..coupon("OLD", 10)
			},
		)
		.await
		.unwrap();
		let err = redeem(&mut conn, 1, "OLD", AT).await.unwrap_err();
		assert!(matches!(err, StoreError::Code(CodeError::Expired)));
		redeem(&mut conn, 1, "OLD", datetime!(2024-05-31 23:00:00 UTC))
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn codes_are_unique_and_generated_when_blank() {
		let pool = memory_pool().await.unwrap();
		let mut conn = pool.acquire().await.unwrap();
		create(&mut conn, &coupon("SPRING", 100)).await.unwrap();
		let err = create(&mut conn, &coupon("spring", 200)).await.unwrap_err();
		assert!(matches!(err, StoreError::DuplicateCode(code) if code == "SPRING"));

		let generated = create(&mut conn, &coupon("  ", 100)).await.unwrap();
		assert_eq!(generated.code.len(), 8);
		assert!(generated
			.code
			.chars()
			.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

		let updated = update(&mut conn, generated.id, &coupon("summer", 300)).await.unwrap();
		assert_eq!(updated.code, "SUMMER");
		assert_eq!(updated.amount, 300);
		assert_eq!(list(&mut conn, 10, 0).await.unwrap().len(), 2);
		assert!(matches!(
			create(&mut conn, &coupon("ZERO", 0)).await,
			Err(StoreError::InvalidAmount(_))
		));
	}

	#[test]
	fn expiry_inputs_are_normalized() {
		assert_eq!(normalize_expiry(None).unwrap(), None);
		assert_eq!(normalize_expiry(Some(" ")).unwrap(), None);
		assert_eq!(
			normalize_expiry(Some("2024-12-31")).unwrap().as_deref(),
			Some("2024-12-31T23:59:59")
		);
		assert_eq!(
			normalize_expiry(Some("2024-12-31 08:30")).unwrap().as_deref(),
			Some("2024-12-31T08:30:00")
		);
		assert!(normalize_expiry(Some("next week")).is_err());
	}
}
