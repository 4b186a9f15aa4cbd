use crate::database::DbPool;
use crate::store::wallet;
use crate::web::auth::AdminSession;
use crate::web::{connection, internal, Chrome, PageResult};
use rocket::{Route, State};
use rocket_dyn_templates::{context, Template};

pub fn routes() -> Vec<Route> {
	rocket::routes![report]
}

#[rocket::get("/wallet")]
async fn report(_session: AdminSession, chrome: Chrome, pool: &State<DbPool>) -> PageResult {
	let mut conn = connection(pool).await?;
	let summary = wallet::summary(&mut conn).await.map_err(internal)?;
	let transactions = wallet::recent(&mut conn, 50).await.map_err(internal)?;
	Ok(Template::render(
		"wallet",
		context! {
			layout: chrome.layout("Wallet", "wallet"),
			summary,
			transactions,
		},
	))
}
