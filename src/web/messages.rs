use crate::bot::texts;
use crate::database::DbPool;
use crate::store::messages::{self, ServiceMessage};
use crate::store::types::ServiceCategory;
use crate::store::StoreError;
use crate::web::auth::AdminSession;
use crate::web::{
	connection, done, failed, filled, internal, missing, query_string, refused, ActionResult,
	Chrome, PageResult, Pager, Panel,
};
use rocket::form::Form;
use rocket::http::{ContentType, Status};
use rocket::{Route, State};
use rocket_dyn_templates::{context, Template};
use sqlx::SqliteConnection;

const PAGE_SIZE: i64 = 20;

pub fn routes() -> Vec<Route> {
	rocket::routes![list, detail, reply, status, attachment]
}

#[derive(serde::Serialize)]
struct CategoryChoice {
	value: &'static str,
	label: &'static str,
}

#[rocket::get("/messages?<category>&<page>")]
async fn list(
	_session: AdminSession,
	chrome: Chrome,
	pool: &State<DbPool>,
	category: Option<&str>,
	page: Option<i64>,
) -> PageResult {
	let selected = filled(category).and_then(|c| c.parse::<ServiceCategory>().ok());
	let mut conn = connection(pool).await?;
	let total = messages::count_service_messages(&mut conn, selected)
		.await
		.map_err(internal)?;
	let pager = Pager::new(page, total, PAGE_SIZE);
	let messages =
		messages::list_service_messages(&mut conn, selected, pager.limit(), pager.offset())
			.await
			.map_err(internal)?;
	let categories: Vec<_> = ServiceCategory::ALL
		.iter()
		.map(|c| CategoryChoice {
			value: c.as_str(),
			label: c.label(),
		})
		.collect();
	Ok(Template::render(
		"messages",
		context! {
			layout: chrome.layout("Messages", "messages"),
			messages,
			pager,
			categories,
			category: selected.map(|c| c.as_str()).unwrap_or(""),
			query: query_string(&[("category", category)]),
		},
	))
}

async fn require_message(conn: &mut SqliteConnection, id: i64) -> Result<ServiceMessage, StoreError> {
	messages::get_service_message(conn, id)
		.await?
		.ok_or(StoreError::MessageNotFound(id))
}

#[rocket::get("/messages/<id>")]
async fn detail(id: i64, _session: AdminSession, chrome: Chrome, pool: &State<DbPool>) -> PageResult {
	let mut conn = connection(pool).await?;
	let message = require_message(&mut conn, id).await.map_err(missing)?;
	let replies = messages::list_replies(&mut conn, id).await.map_err(internal)?;
	Ok(Template::render(
		"message",
		context! {
			layout: chrome.layout(format!("Message #{}", id), "messages"),
			category_label: message.category.label(),
			message,
			replies,
		},
	))
}

#[derive(rocket::FromForm)]
struct ReplyForm<'r> {
	text: &'r str,
}

#[rocket::post("/messages/<id>/reply", data = "<form>")]
async fn reply(
	id: i64,
	form: Form<ReplyForm<'_>>,
	_session: AdminSession,
	pool: &State<DbPool>,
	panel: &State<Panel>,
) -> ActionResult {
	let back = format!("/messages/{}", id);
	let mut conn = connection(pool).await?;
	let message = require_message(&mut conn, id).await.map_err(missing)?;
	let Some(text) = filled(Some(form.text)) else {
		return failed(back, "The reply cannot be empty.");
	};
	let admin = panel.settings.admin_web.user.clone();
	if let Err(e) = messages::add_reply(&mut conn, id, &admin, text).await {
		return refused(e, back);
	}
	drop(conn);
	if panel
		.tell(message.user_id, &texts::support_reply(id, text))
		.await
	{
		done(back, "Reply sent.")
	} else {
		done(back, "Reply saved, but the user could not be reached.")
	}
}

#[derive(rocket::FromForm)]
struct StatusForm<'r> {
	action: &'r str,
}

#[rocket::post("/messages/<id>/status", data = "<form>")]
async fn status(
	id: i64,
	form: Form<StatusForm<'_>>,
	_session: AdminSession,
	pool: &State<DbPool>,
) -> ActionResult {
	let back = format!("/messages/{}", id);
	let resolved = match form.action {
		"resolve" => true,
		"reopen" => false,
		_ => return failed(back, "Unknown action."),
	};
	let mut conn = connection(pool).await?;
	match messages::set_resolved(&mut conn, id, resolved).await {
		Ok(()) => done(
			back,
			if resolved {
				"Marked as resolved."
			} else {
				"Reopened."
			},
		),
		Err(e) => refused(e, back),
	}
}

#[rocket::get("/messages/<id>/attachment")]
async fn attachment(
	id: i64,
	_session: AdminSession,
	pool: &State<DbPool>,
	panel: &State<Panel>,
) -> Result<(ContentType, Vec<u8>), Status> {
	let mut conn = connection(pool).await?;
	let message = require_message(&mut conn, id).await.map_err(missing)?;
	drop(conn);
	let file_id = message.attachment_file_id.ok_or(Status::NotFound)?;
	panel.fetch(&file_id).await
}
