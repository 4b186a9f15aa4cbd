use crate::database::DbPool;
use crate::store::types::now;
use crate::store::{orders, reports, users, wallet};
use crate::web::auth::AdminSession;
use crate::web::{connection, internal, Chrome, PageResult};
use rocket::response::Redirect;
use rocket::{Route, State};
use rocket_dyn_templates::{context, Template};

pub fn routes() -> Vec<Route> {
	rocket::routes![index, dashboard]
}

#[rocket::get("/")]
fn index(_session: AdminSession) -> Redirect {
	Redirect::to("/dashboard")
}

#[rocket::get("/dashboard")]
async fn dashboard(_session: AdminSession, chrome: Chrome, pool: &State<DbPool>) -> PageResult {
	let mut conn = connection(pool).await?;
	let snapshot = reports::dashboard_snapshot(&mut conn, now())
		.await
		.map_err(internal)?;
	let recent_orders = orders::recent(&mut conn, 8).await.map_err(internal)?;
	let recent_users = users::recent_users(&mut conn, 6).await.map_err(internal)?;
	let recent_wallet = wallet::recent(&mut conn, 10).await.map_err(internal)?;
	Ok(Template::render(
		"dashboard",
		context! {
			layout: chrome.layout("Dashboard", "dashboard"),
			snapshot,
			recent_orders,
			recent_users,
			recent_wallet,
		},
	))
}
