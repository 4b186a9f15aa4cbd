use crate::database::DbPool;
use crate::store::catalog::Catalog;
use crate::store::discounts::{self, parse_product_ids, NewDiscount};
use crate::web::auth::AdminSession;
use crate::web::coupons::{amount_field, limit_field, per_user_field, CodeForm};
use crate::web::{
	connection, done, failed, filled, internal, refused, ActionResult, Chrome, PageResult,
};
use rocket::form::Form;
use rocket::{Route, State};
use rocket_dyn_templates::{context, Template};

const BACK: &str = "/discounts";

pub fn routes() -> Vec<Route> {
	rocket::routes![list, create, toggle]
}

#[rocket::get("/discounts")]
async fn list(_session: AdminSession, chrome: Chrome, pool: &State<DbPool>) -> PageResult {
	let mut conn = connection(pool).await?;
	let discounts = discounts::list(&mut conn, 200, 0).await.map_err(internal)?;
	let products: Vec<_> = Catalog::load(&mut conn)
		.await
		.map_err(internal)?
		.admin_tree()
		.into_iter()
		.filter(|entry| !entry.product.is_category)
		.collect();
	Ok(Template::render(
		"discounts",
		context! {
			layout: chrome.layout("Discounts", "discounts"),
			discounts,
			products,
		},
	))
}

fn new_discount(form: &CodeForm<'_>) -> Result<NewDiscount, String> {
	let product_ids = parse_product_ids(filled(form.product_ids).unwrap_or(""));
	Ok(NewDiscount {
		code: filled(form.code).unwrap_or("").to_owned(),
		amount: amount_field(form.amount)?,
		usage_limit: limit_field(form.usage_limit)?,
		usage_limit_per_user: per_user_field(form.usage_limit_per_user)?,
		applies_all: form.applies_all || product_ids.is_empty(),
		product_ids,
		expires_at: filled(form.expires_at).map(str::to_owned),
	})
}

#[rocket::post("/discounts/create", data = "<form>")]
async fn create(form: Form<CodeForm<'_>>, _session: AdminSession, pool: &State<DbPool>) -> ActionResult {
	let new = match new_discount(&form) {
		Ok(new) => new,
		Err(reason) => return failed(BACK, reason),
	};
	let mut conn = connection(pool).await?;
	match discounts::create(&mut conn, &new).await {
		Ok(discount) => done(BACK, format!("Discount {} created.", discount.code)),
		Err(e) => refused(e, BACK),
	}
}

#[rocket::post("/discounts/<id>/toggle")]
async fn toggle(id: i64, _session: AdminSession, pool: &State<DbPool>) -> ActionResult {
	let mut conn = connection(pool).await?;
	match discounts::toggle(&mut conn, id).await {
		Ok(true) => done(BACK, "Discount enabled."),
		Ok(false) => done(BACK, "Discount disabled."),
		Err(e) => refused(e, BACK),
	}
}
