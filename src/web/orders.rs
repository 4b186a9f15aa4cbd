use crate::bot::texts;
use crate::database::DbPool;
use crate::store::messages::{add_order_manager_message, list_order_messages};
use crate::store::orders::{self, OrderFilter};
use crate::store::types::{parse_amount, OrderStatus, PaymentType};
use crate::store::{users, wallet};
use crate::web::auth::AdminSession;
use crate::web::{
	connection, done, failed, filled, internal, missing, query_string, refused, ActionResult,
	Chrome, PageResult, Pager, Panel,
};
use rocket::form::Form;
use rocket::http::{ContentType, Status};
use rocket::{Route, State};
use rocket_dyn_templates::{context, Template};

const PAGE_SIZE: i64 = 20;

pub fn routes() -> Vec<Route> {
	rocket::routes![list, detail, receipt, update]
}

#[derive(serde::Serialize)]
pub struct Choice {
	pub value: &'static str,
	pub label: &'static str,
}

pub fn status_choices() -> Vec<Choice> {
	OrderStatus::ALL
		.iter()
		.map(|s| Choice {
			value: s.as_str(),
			label: s.label(),
		})
		.collect()
}

fn payment_choices() -> Vec<Choice> {
	PaymentType::ALL
		.iter()
		.map(|p| Choice {
			value: p.as_str(),
			label: p.label(),
		})
		.collect()
}

#[rocket::get("/orders?<status>&<q>&<page>")]
async fn list(
	_session: AdminSession,
	chrome: Chrome,
	pool: &State<DbPool>,
	status: Option<&str>,
	q: Option<&str>,
	page: Option<i64>,
) -> PageResult {
	let status_filter = filled(status).and_then(|s| s.parse::<OrderStatus>().ok());
	let filter = OrderFilter {
		status: status_filter,
		user_id: None,
		search: filled(q).map(str::to_owned),
	};
	let mut conn = connection(pool).await?;
	let total = orders::count_orders(&mut conn, &filter).await.map_err(internal)?;
	let pager = Pager::new(page, total, PAGE_SIZE);
	let orders = orders::list_orders(&mut conn, &filter, pager.limit(), pager.offset())
		.await
		.map_err(internal)?;
	Ok(Template::render(
		"orders",
		context! {
			layout: chrome.layout("Orders", "orders"),
			orders,
			pager,
			statuses: status_choices(),
			status: status_filter.map(|s| s.as_str()).unwrap_or(""),
			q: filled(q).unwrap_or(""),
			query: query_string(&[("status", status), ("q", q)]),
		},
	))
}

#[rocket::get("/orders/<id>")]
async fn detail(id: i64, _session: AdminSession, chrome: Chrome, pool: &State<DbPool>) -> PageResult {
	let mut conn = connection(pool).await?;
	let order = orders::require_order(&mut conn, id).await.map_err(missing)?;
	let customer = users::get_user(&mut conn, order.user_id).await.map_err(internal)?;
	let transactions = wallet::list_for_order(&mut conn, id).await.map_err(internal)?;
	let manager_messages = list_order_messages(&mut conn, id).await.map_err(internal)?;
	Ok(Template::render(
		"order",
		context! {
			layout: chrome.layout(format!("Order #{}", id), "orders"),
			payable: order.payable(),
			card_part: order.card_part(),
			plan_pending: order.status == OrderStatus::PendingPlan,
			order,
			customer,
			transactions,
			manager_messages,
			statuses: status_choices(),
			payment_types: payment_choices(),
		},
	))
}

#[rocket::get("/orders/<id>/receipt")]
async fn receipt(
	id: i64,
	_session: AdminSession,
	pool: &State<DbPool>,
	panel: &State<Panel>,
) -> Result<(ContentType, Vec<u8>), Status> {
	let mut conn = connection(pool).await?;
	let order = orders::require_order(&mut conn, id).await.map_err(missing)?;
	drop(conn);
	let file_id = order.receipt_file_id.ok_or(Status::NotFound)?;
	panel.fetch(&file_id).await
}

#[derive(rocket::FromForm)]
struct OrderUpdate<'r> {
	action: &'r str,
	status: Option<&'r str>,
	payment_type: Option<&'r str>,
	manager_note: Option<&'r str>,
	internal_cost: Option<&'r str>,
}

#[rocket::post("/orders/<id>/update", data = "<form>")]
async fn update(
	id: i64,
	form: Form<OrderUpdate<'_>>,
	_session: AdminSession,
	pool: &State<DbPool>,
	panel: &State<Panel>,
) -> ActionResult {
	let back = format!("/orders/{}", id);
	let mut conn = connection(pool).await?;
	orders::require_order(&mut conn, id).await.map_err(missing)?;
	match form.action {
		"status" | "plan_confirm" => {
			let requested = if form.action == "plan_confirm" {
				OrderStatus::PlanConfirmed
			} else {
				match filled(form.status).and_then(|s| s.parse::<OrderStatus>().ok()) {
					Some(status) => status,
					None => return failed(back, "Pick a valid status."),
				}
			};
			let change = match orders::admin_set_status(&mut conn, id, requested).await {
				Ok(change) => change,
				Err(e) => return refused(e, back),
			};
			drop(conn);
			if !change.changed {
				return done(
					back,
					format!("Order #{} is already {}.", id, change.order.status.label()),
				);
			}
			let text = texts::status_update(
				&change.order,
				change.refunded,
				change.plan_approved,
				&panel.settings.shop,
			);
			let reached = panel.tell(change.order.user_id, &text).await;
			let mut message = format!("Order #{} is now {}.", id, change.order.status.label());
			if change.refunded > 0 {
				message.push_str(&format!(
					" {} was refunded to the wallet.",
					texts::money(change.refunded, panel.currency())
				));
			}
			if !reached {
				message.push_str(" The customer could not be notified.");
			}
			done(back, message)
		}
		"payment" => {
			let payment_type = match filled(form.payment_type) {
				None => None,
				Some(raw) => match raw.parse::<PaymentType>() {
					Ok(payment_type) => Some(payment_type),
					Err(_) => return failed(back, "Pick a valid payment type."),
				},
			};
			if let Err(e) = orders::set_payment_type(&mut conn, id, payment_type).await {
				return refused(e, back);
			}
			done(back, "Payment type saved.")
		}
		"manager_note" => {
			let Some(note) = filled(form.manager_note) else {
				return failed(back, "The note cannot be empty.");
			};
			let order = match orders::require_order(&mut conn, id).await {
				Ok(order) => order,
				Err(e) => return refused(e, back),
			};
			if let Err(e) = orders::set_manager_note(&mut conn, id, note).await {
				return refused(e, back);
			}
			if let Err(e) = add_order_manager_message(&mut conn, id, order.user_id, note).await {
				return refused(e, back);
			}
			drop(conn);
			if panel
				.tell(order.user_id, &texts::manager_message(Some(id), note))
				.await
			{
				done(back, "Note saved and sent to the customer.")
			} else {
				done(back, "Note saved, but the customer could not be notified.")
			}
		}
		"financial" => {
			let cost = match filled(form.internal_cost).map(parse_amount) {
				None => Some(0),
				Some(parsed) => parsed.filter(|cost| *cost >= 0),
			};
			let Some(cost) = cost else {
				return failed(back, "The cost must be a whole number of zero or more.");
			};
			match orders::set_financials(&mut conn, id, cost).await {
				Ok(order) => done(
					back,
					format!(
						"Cost saved, net revenue is {}.",
						texts::money(order.net_revenue, panel.currency())
					),
				),
				Err(e) => refused(e, back),
			}
		}
		other => failed(back, format!("Unknown action `{}`.", other)),
	}
}
