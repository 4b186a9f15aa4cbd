use crate::bot::texts;
use crate::database::DbPool;
use crate::store::messages::{
	add_user_manager_message, list_order_messages_for_user, list_user_messages,
};
use crate::store::orders::{self, OrderFilter};
use crate::store::types::{parse_amount, WalletTxKind};
use crate::store::{users, wallet};
use crate::web::auth::AdminSession;
use crate::web::{
	connection, done, failed, filled, internal, missing, query_string, refused, ActionResult,
	Chrome, PageResult, Pager, Panel,
};
use rocket::form::Form;
use rocket::{Route, State};
use rocket_dyn_templates::{context, Template};
use tracing::*;

const PAGE_SIZE: i64 = 20;

pub fn routes() -> Vec<Route> {
	rocket::routes![list, detail, wallet_adjust, message, block]
}

#[rocket::get("/users?<q>&<page>")]
async fn list(
	_session: AdminSession,
	chrome: Chrome,
	pool: &State<DbPool>,
	q: Option<&str>,
	page: Option<i64>,
) -> PageResult {
	let search = filled(q);
	let mut conn = connection(pool).await?;
	let total = users::count_users(&mut conn, search).await.map_err(internal)?;
	let pager = Pager::new(page, total, PAGE_SIZE);
	let users = users::list_users(&mut conn, search, pager.limit(), pager.offset())
		.await
		.map_err(internal)?;
	Ok(Template::render(
		"users",
		context! {
			layout: chrome.layout("Users", "users"),
			users,
			pager,
			q: search.unwrap_or(""),
			query: query_string(&[("q", q)]),
		},
	))
}

#[rocket::get("/users/<id>")]
async fn detail(id: i64, _session: AdminSession, chrome: Chrome, pool: &State<DbPool>) -> PageResult {
	let mut conn = connection(pool).await?;
	let user = users::require_user(&mut conn, id).await.map_err(missing)?;
	let stats = users::user_stats(&mut conn, id).await.map_err(internal)?;
	let filter = OrderFilter {
		user_id: Some(id),
		..OrderFilter::default()
	};
	let orders = orders::list_orders(&mut conn, &filter, 10, 0)
		.await
		.map_err(internal)?;
	let transactions = wallet::list_for_user(&mut conn, id, 25)
		.await
		.map_err(internal)?;
	let user_messages = list_user_messages(&mut conn, id, 20).await.map_err(internal)?;
	let order_messages = list_order_messages_for_user(&mut conn, id, 20)
		.await
		.map_err(internal)?;
	Ok(Template::render(
		"user",
		context! {
			layout: chrome.layout(user.display_name(), "users"),
			user,
			stats,
			orders,
			transactions,
			user_messages,
			order_messages,
		},
	))
}

/// The signed balance change an admin adjustment makes, debit and reserve take money out.
pub fn adjustment_delta(kind: WalletTxKind, amount: i64) -> i64 {
	match kind {
		WalletTxKind::Credit | WalletTxKind::Refund => amount,
		WalletTxKind::Debit | WalletTxKind::Reserve => -amount,
	}
}

#[derive(rocket::FromForm)]
struct WalletAdjust<'r> {
	action: &'r str,
	amount: &'r str,
	note: Option<&'r str>,
}

#[rocket::post("/users/<id>/wallet-adjust", data = "<form>")]
async fn wallet_adjust(
	id: i64,
	form: Form<WalletAdjust<'_>>,
	_session: AdminSession,
	pool: &State<DbPool>,
	panel: &State<Panel>,
) -> ActionResult {
	let back = format!("/users/{}", id);
	let Ok(kind) = form.action.parse::<WalletTxKind>() else {
		return failed(back, "Pick credit, debit, refund or reserve.");
	};
	let amount = match parse_amount(form.amount) {
		Some(amount) if amount > 0 => amount,
		_ => return failed(back, "The amount must be a whole number above zero."),
	};
	let note = filled(form.note).unwrap_or("Admin adjustment");
	let delta = adjustment_delta(kind, amount);
	let mut conn = connection(pool).await?;
	users::require_user(&mut conn, id).await.map_err(missing)?;
	let balance = match wallet::change_wallet(&mut conn, id, delta, kind, note, None).await {
		Ok(balance) => balance,
		Err(e) => return refused(e, back),
	};
	drop(conn);
	info!("Admin adjusted the wallet of user {} by {} ({})", id, delta, kind.as_str());
	let text = texts::wallet_adjusted(delta, balance, note, panel.currency());
	let mut message = format!(
		"Wallet updated, the balance is now {}.",
		texts::money(balance, panel.currency())
	);
	if !panel.tell(id, &text).await {
		message.push_str(" The user could not be notified.");
	}
	done(back, message)
}

#[derive(rocket::FromForm)]
struct MessageForm<'r> {
	text: &'r str,
}

#[rocket::post("/users/<id>/message", data = "<form>")]
async fn message(
	id: i64,
	form: Form<MessageForm<'_>>,
	_session: AdminSession,
	pool: &State<DbPool>,
	panel: &State<Panel>,
) -> ActionResult {
	let back = format!("/users/{}", id);
	let Some(text) = filled(Some(form.text)) else {
		return failed(back, "The message cannot be empty.");
	};
	let mut conn = connection(pool).await?;
	users::require_user(&mut conn, id).await.map_err(missing)?;
	if let Err(e) = add_user_manager_message(&mut conn, id, text).await {
		return refused(e, back);
	}
	drop(conn);
	if panel.tell(id, &texts::manager_message(None, text)).await {
		done(back, "Message sent.")
	} else {
		done(back, "Message saved, but the user could not be reached.")
	}
}

#[derive(rocket::FromForm)]
struct BlockForm<'r> {
	action: &'r str,
}

#[rocket::post("/users/<id>/block", data = "<form>")]
async fn block(
	id: i64,
	form: Form<BlockForm<'_>>,
	_session: AdminSession,
	pool: &State<DbPool>,
	panel: &State<Panel>,
) -> ActionResult {
	let back = format!("/users/{}", id);
	let blocked = match form.action {
		"block" => true,
		"unblock" => false,
		_ => return failed(back, "Unknown action."),
	};
	let mut conn = connection(pool).await?;
	if let Err(e) = users::set_blocked(&mut conn, id, blocked).await {
		return refused(e, back);
	}
	drop(conn);
	info!("Admin set blocked={} for user {}", blocked, id);
	panel.tell(id, texts::access_changed(blocked)).await;
	done(back, if blocked { "User blocked." } else { "User unblocked." })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn debit_and_reserve_reduce_the_balance() {
		assert_eq!(adjustment_delta(WalletTxKind::Credit, 500), 500);
		assert_eq!(adjustment_delta(WalletTxKind::Refund, 500), 500);
		assert_eq!(adjustment_delta(WalletTxKind::Debit, 500), -500);
		assert_eq!(adjustment_delta(WalletTxKind::Reserve, 500), -500);
	}
}
