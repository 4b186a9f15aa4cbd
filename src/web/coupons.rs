//! Wallet top up codes.

use crate::database::DbPool;
use crate::store::coupons::{self, NewCoupon};
use crate::store::types::parse_amount;
use crate::web::auth::AdminSession;
use crate::web::{
	connection, done, failed, filled, internal, refused, ActionResult, Chrome, PageResult,
};
use rocket::form::Form;
use rocket::{Route, State};
use rocket_dyn_templates::{context, Template};

const BACK: &str = "/coupons";

pub fn routes() -> Vec<Route> {
	rocket::routes![list, create, update, toggle]
}

#[rocket::get("/coupons")]
async fn list(_session: AdminSession, chrome: Chrome, pool: &State<DbPool>) -> PageResult {
	let mut conn = connection(pool).await?;
	let coupons = coupons::list(&mut conn, 200, 0).await.map_err(internal)?;
	Ok(Template::render(
		"coupons",
		context! {
			layout: chrome.layout("Coupons", "coupons"),
			coupons,
		},
	))
}

/// The form shared by coupons and discounts, limits left empty mean unlimited.
#[derive(rocket::FromForm)]
pub struct CodeForm<'r> {
	pub code: Option<&'r str>,
	pub amount: &'r str,
	pub usage_limit: Option<&'r str>,
	pub usage_limit_per_user: Option<&'r str>,
	pub expires_at: Option<&'r str>,
	pub is_active: bool,
	pub applies_all: bool,
	pub product_ids: Option<&'r str>,
}

/// Reads a limit field, empty means zero which is unlimited.
pub fn limit_field(value: Option<&str>) -> Result<i64, String> {
	match filled(value) {
		None => Ok(0),
		Some(raw) => parse_amount(raw)
			.filter(|limit| *limit >= 0)
			.ok_or_else(|| format!("`{}` is not a valid limit.", raw)),
	}
}

/// Reads a per-user limit, empty means a single use per user.
pub fn per_user_field(value: Option<&str>) -> Result<i64, String> {
	match filled(value) {
		None => Ok(1),
		Some(raw) => parse_amount(raw)
			.filter(|limit| *limit >= 1)
			.ok_or_else(|| "Uses per user must be 1 or more.".to_owned()),
	}
}

pub fn amount_field(value: &str) -> Result<i64, String> {
	parse_amount(value)
		.filter(|amount| *amount > 0)
		.ok_or_else(|| "The amount must be a whole number above zero.".to_owned())
}

impl CodeForm<'_> {
	fn coupon(&self) -> Result<NewCoupon, String> {
		Ok(NewCoupon {
			code: filled(self.code).unwrap_or("").to_owned(),
			amount: amount_field(self.amount)?,
			usage_limit: limit_field(self.usage_limit)?,
			usage_limit_per_user: per_user_field(self.usage_limit_per_user)?,
			expires_at: filled(self.expires_at).map(str::to_owned),
			is_active: self.is_active,
		})
	}
}

#[rocket::post("/coupons/create", data = "<form>")]
async fn create(form: Form<CodeForm<'_>>, _session: AdminSession, pool: &State<DbPool>) -> ActionResult {
	let new = match form.coupon() {
		Ok(new) => new,
		Err(reason) => return failed(BACK, reason),
	};
	let mut conn = connection(pool).await?;
	match coupons::create(&mut conn, &new).await {
		Ok(coupon) => done(BACK, format!("Coupon {} created.", coupon.code)),
		Err(e) => refused(e, BACK),
	}
}

#[rocket::post("/coupons/<id>/update", data = "<form>")]
async fn update(
	id: i64,
	form: Form<CodeForm<'_>>,
	_session: AdminSession,
	pool: &State<DbPool>,
) -> ActionResult {
	let new = match form.coupon() {
		Ok(new) => new,
		Err(reason) => return failed(BACK, reason),
	};
	let mut conn = connection(pool).await?;
	match coupons::update(&mut conn, id, &new).await {
		Ok(coupon) => done(BACK, format!("Coupon {} saved.", coupon.code)),
		Err(e) => refused(e, BACK),
	}
}

#[rocket::post("/coupons/<id>/toggle")]
async fn toggle(id: i64, _session: AdminSession, pool: &State<DbPool>) -> ActionResult {
	let mut conn = connection(pool).await?;
	match coupons::toggle(&mut conn, id).await {
		Ok(true) => done(BACK, "Coupon enabled."),
		Ok(false) => done(BACK, "Coupon disabled."),
		Err(e) => refused(e, BACK),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_limits_are_unlimited() {
		assert_eq!(limit_field(None), Ok(0));
		assert_eq!(limit_field(Some(" ")), Ok(0));
		assert_eq!(limit_field(Some("5")), Ok(5));
		assert!(limit_field(Some("-1")).is_err());
		assert!(limit_field(Some("lots")).is_err());
	}

	#[test]
	fn blank_per_user_limit_means_one_use() {
		assert_eq!(per_user_field(None), Ok(1));
		assert_eq!(per_user_field(Some("")), Ok(1));
		assert_eq!(per_user_field(Some("3")), Ok(3));
		assert!(per_user_field(Some("0")).is_err());
		assert!(per_user_field(Some("-2")).is_err());
	}

	#[test]
	fn amounts_must_be_positive() {
		assert_eq!(amount_field("50,000"), Ok(50_000));
		assert!(amount_field("0").is_err());
		assert!(amount_field("").is_err());
	}
}
