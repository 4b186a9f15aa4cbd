use crate::database::DbPool;
use crate::store::catalog::{self, Catalog, NewProduct, ProductUpdate};
use crate::store::types::parse_amount;
use crate::web::auth::AdminSession;
use crate::web::{
	connection, done, failed, filled, internal, refused, ActionResult, Chrome, PageResult,
};
use rocket::form::Form;
use rocket::{Route, State};
use rocket_dyn_templates::{context, Template};

const BACK: &str = "/products";

pub fn routes() -> Vec<Route> {
	rocket::routes![list, create, update, delete, bulk_update]
}

#[rocket::get("/products")]
async fn list(_session: AdminSession, chrome: Chrome, pool: &State<DbPool>) -> PageResult {
	let mut conn = connection(pool).await?;
	let tree = Catalog::load(&mut conn).await.map_err(internal)?.admin_tree();
	let categories: Vec<_> = tree
		.iter()
		.filter(|entry| entry.product.is_category)
		.cloned()
		.collect();
	Ok(Template::render(
		"products",
		context! {
			layout: chrome.layout("Products", "products"),
			tree,
			categories,
		},
	))
}

/// Empty number fields are zero, negative ones are refused.
fn number(value: Option<&str>, field: &str) -> Result<i64, String> {
	match filled(value) {
		None => Ok(0),
		Some(raw) => parse_amount(raw)
			.filter(|n| *n >= 0)
			.ok_or_else(|| format!("{} must be a whole number of zero or more.", field)),
	}
}

fn parent(value: Option<&str>) -> Result<Option<i64>, String> {
	match filled(value) {
		None => Ok(None),
		Some(raw) => raw
			.parse()
			.map(Some)
			.map_err(|_| format!("`{}` is not a category id.", raw)),
	}
}

#[derive(rocket::FromForm)]
struct ProductForm<'r> {
	parent_id: Option<&'r str>,
	title: &'r str,
	description: Option<&'r str>,
	price: Option<&'r str>,
	is_category: bool,
	available: bool,
	request_only: bool,
	account_enabled: bool,
	self_available: bool,
	self_price: Option<&'r str>,
	pre_available: bool,
	pre_price: Option<&'r str>,
	require_username: bool,
	require_password: bool,
	allow_first_plan: bool,
	cashback_enabled: bool,
	cashback_percent: Option<&'r str>,
	sort_order: Option<&'r str>,
}

impl ProductForm<'_> {
	fn title(&self) -> Result<String, String> {
		filled(Some(self.title))
			.map(str::to_owned)
			.ok_or_else(|| "The title cannot be empty.".to_owned())
	}

	fn new_product(&self) -> Result<NewProduct, String> {
		Ok(NewProduct {
			parent_id: parent(self.parent_id)?,
			title: self.title()?,
			description: self.description.unwrap_or("").trim().to_owned(),
			price: number(self.price, "Price")?,
			available: self.available,
			is_category: self.is_category,
			request_only: self.request_only,
			account_enabled: self.account_enabled,
			self_available: self.self_available,
			self_price: number(self.self_price, "Own account price")?,
			pre_available: self.pre_available,
			pre_price: number(self.pre_price, "Prebuilt account price")?,
			require_username: self.require_username,
			require_password: self.require_password,
			allow_first_plan: self.allow_first_plan,
			cashback_enabled: self.cashback_enabled,
			cashback_percent: number(self.cashback_percent, "Cashback percent")?,
			sort_order: number(self.sort_order, "Sort order")?,
		})
	}

	fn update(&self) -> Result<ProductUpdate, String> {
		let new = self.new_product()?;
		Ok(ProductUpdate {
			parent_id: Some(new.parent_id),
			title: Some(new.title),
			description: Some(new.description),
			price: Some(new.price),
			available: Some(new.available),
			request_only: Some(new.request_only),
			account_enabled: Some(new.account_enabled),
			self_available: Some(new.self_available),
			self_price: Some(new.self_price),
			pre_available: Some(new.pre_available),
			pre_price: Some(new.pre_price),
			require_username: Some(new.require_username),
			require_password: Some(new.require_password),
			allow_first_plan: Some(new.allow_first_plan),
			cashback_enabled: Some(new.cashback_enabled),
			cashback_percent: Some(new.cashback_percent),
			sort_order: Some(new.sort_order),
		})
	}
}

#[rocket::post("/products/create", data = "<form>")]
async fn create(form: Form<ProductForm<'_>>, _session: AdminSession, pool: &State<DbPool>) -> ActionResult {
	let new = match form.new_product() {
		Ok(new) => new,
		Err(reason) => return failed(BACK, reason),
	};
	let mut conn = connection(pool).await?;
	match catalog::create_product(&mut conn, new).await {
		Ok(id) => done(BACK, format!("Created #{}.", id)),
		Err(e) => refused(e, BACK),
	}
}

#[rocket::post("/products/<id>/update", data = "<form>")]
async fn update(
	id: i64,
	form: Form<ProductForm<'_>>,
	_session: AdminSession,
	pool: &State<DbPool>,
) -> ActionResult {
	let update = match form.update() {
		Ok(update) => update,
		Err(reason) => return failed(BACK, reason),
	};
	let mut conn = connection(pool).await?;
	match catalog::update_product(&mut conn, id, update).await {
		Ok(product) => done(BACK, format!("Saved {}.", product.title)),
		Err(e) => refused(e, BACK),
	}
}

#[rocket::post("/products/<id>/delete")]
async fn delete(id: i64, _session: AdminSession, pool: &State<DbPool>) -> ActionResult {
	let mut conn = connection(pool).await?;
	match catalog::delete_product(&mut conn, id).await {
		Ok(()) => done(BACK, format!("Deleted #{}.", id)),
		Err(e) => refused(e, BACK),
	}
}

#[derive(rocket::FromForm)]
struct BulkRow<'r> {
	id: i64,
	price: Option<&'r str>,
	available: bool,
	sort_order: Option<&'r str>,
}

#[derive(rocket::FromForm)]
struct BulkForm<'r> {
	rows: Vec<BulkRow<'r>>,
}

/// Price, availability and position for many entries at once, all saved or none.
#[rocket::post("/products/bulk-update", data = "<form>")]
async fn bulk_update(form: Form<BulkForm<'_>>, _session: AdminSession, pool: &State<DbPool>) -> ActionResult {
	let mut updates = Vec::with_capacity(form.rows.len());
	for row in &form.rows {
		let price = match number(row.price, "Price") {
			Ok(price) => price,
			Err(reason) => return failed(BACK, format!("#{}: {}", row.id, reason)),
		};
		let sort_order = match number(row.sort_order, "Sort order") {
			Ok(sort_order) => sort_order,
			Err(reason) => return failed(BACK, format!("#{}: {}", row.id, reason)),
		};
		updates.push((
			row.id,
			ProductUpdate {
				price: Some(price),
				available: Some(row.available),
				sort_order: Some(sort_order),
				..ProductUpdate::default()
			},
		));
	}
	if updates.is_empty() {
		return failed(BACK, "Nothing to update.");
	}
	let mut conn = connection(pool).await?;
	match catalog::bulk_update(&mut conn, updates).await {
		Ok(count) => done(BACK, format!("Updated {} entries.", count)),
		Err(e) => refused(e, BACK),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_numbers_are_zero_and_negatives_refused() {
		assert_eq!(number(None, "Price"), Ok(0));
		assert_eq!(number(Some("12,500"), "Price"), Ok(12_500));
		assert_eq!(
			number(Some("-3"), "Price"),
			Err("Price must be a whole number of zero or more.".to_owned())
		);
	}

	#[test]
	fn blank_parent_is_the_root() {
		assert_eq!(parent(Some("")), Ok(None));
		assert_eq!(parent(Some("4")), Ok(Some(4)));
		assert!(parent(Some("four")).is_err());
	}
}
