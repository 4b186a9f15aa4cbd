use super::*;
use crate::config::Settings;
use crate::database::memory_pool;
use crate::notify::testing::{RecordingNotifier, Sent};
use crate::store::orders::{create_order, reserve_mixed, submit_receipt, NewOrder, OrderPolicy};
use crate::store::types::{now, OrderStatus, WalletTxKind};
use crate::store::{messages, orders, users, wallet};
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::{Client, LocalResponse};

struct Harness {
	client: Client,
	pool: DbPool,
	notifier: Arc<RecordingNotifier>,
}

async fn harness() -> Harness {
	let pool = memory_pool().await.unwrap();
	let settings = Settings::from_lookup(|name| match name {
		"ADMIN_WEB_USER" => Some("boss".to_owned()),
		"ADMIN_WEB_PASS" => Some("s3cret".to_owned()),
		"ADMIN_WEB_SECRET" => Some("test secret".to_owned()),
		_ => None,
	})
	.unwrap();
	let config = WebConfig::from_settings(&settings.admin_web);
	let credentials =
		AdminCredentials::new(&settings.admin_web.user, &settings.admin_web.pass).unwrap();
	let notifier = Arc::new(RecordingNotifier::default());
	let panel = Panel {
		settings: Arc::new(settings),
		notifier: notifier.clone(),
	};
	let client = Client::tracked(build_rocket(&config, pool.clone(), panel, credentials))
		.await
		.unwrap();
	Harness {
		client,
		pool,
		notifier,
	}
}

async fn signed_in() -> Harness {
	let harness = harness().await;
	{
		let response = harness
			.client
			.post("/login")
			.header(ContentType::Form)
			.body("username=boss&password=s3cret&next=/dashboard")
			.dispatch()
			.await;
		assert_eq!(response.status(), Status::SeeOther);
		assert_eq!(response.headers().get_one("Location"), Some("/dashboard"));
	}
	harness
}

fn location(response: &LocalResponse<'_>) -> String {
	response
		.headers()
		.get_one("Location")
		.unwrap_or_default()
		.to_owned()
}

async fn post_form<'c>(client: &'c Client, uri: String, body: &str) -> LocalResponse<'c> {
	client
		.post(uri)
		.header(ContentType::Form)
		.body(body.to_owned())
		.dispatch()
		.await
}

/// A customer with a 5,000 wallet and a 20,000 order holding a 3,000 reservation.
async fn seed_order(pool: &DbPool) -> i64 {
	let mut conn = pool.acquire().await.unwrap();
	users::ensure_user(&mut conn, 7, Some("buyer"), Some("Sam"))
		.await
		.unwrap();
	wallet::change_wallet(&mut conn, 7, 5_000, WalletTxKind::Credit, "top up", None)
		.await
		.unwrap();
	let new = NewOrder {
		user_id: 7,
		title: "Plus".to_owned(),
		amount_total: 20_000,
		currency: "Toman".to_owned(),
		..NewOrder::default()
	};
	let order = create_order(&mut conn, new, &OrderPolicy::default(), now())
		.await
		.unwrap();
	reserve_mixed(&mut conn, order.id, 7, 3_000).await.unwrap();
	order.id
}

#[tokio::test]
async fn pages_require_a_session() {
	let harness = harness().await;
	let response = harness.client.get("/orders").dispatch().await;
	assert!(location(&response).starts_with("/login?next="));

	let response = harness.client.get("/login").dispatch().await;
	assert_eq!(response.status(), Status::Ok);
	let response = harness.client.get("/static/admin.css").dispatch().await;
	assert_eq!(response.status(), Status::Ok);
	assert_eq!(response.content_type(), Some(ContentType::CSS));
}

#[tokio::test]
async fn wrong_password_is_refused_with_a_flash() {
	let harness = harness().await;
	let response = post_form(
		&harness.client,
		"/login".to_owned(),
		"username=boss&password=guess&next=/orders",
	)
	.await;
	assert!(location(&response).starts_with("/login"));
	let page = harness
		.client
		.get("/login")
		.dispatch()
		.await
		.into_string()
		.await
		.unwrap();
	assert!(page.contains("Invalid username or password."));
	let response = harness.client.get("/dashboard").dispatch().await;
	assert!(location(&response).starts_with("/login"));
}

#[tokio::test]
async fn logout_ends_the_session() {
	let harness = signed_in().await;
	let response = harness.client.get("/dashboard").dispatch().await;
	assert_eq!(response.status(), Status::Ok);
	let body = response.into_string().await.unwrap();
	assert!(body.contains("Premium Shop"));

	let response = harness.client.post("/logout").dispatch().await;
	assert_eq!(location(&response), "/login");
	let response = harness.client.get("/dashboard").dispatch().await;
	assert!(location(&response).starts_with("/login"));
}

#[tokio::test]
async fn theme_toggle_flips_the_cookie() {
	let harness = signed_in().await;
	let response = post_form(&harness.client, "/toggle-theme".to_owned(), "next=/wallet").await;
	assert_eq!(location(&response), "/wallet");
	let page = harness
		.client
		.get("/wallet")
		.dispatch()
		.await
		.into_string()
		.await
		.unwrap();
	assert!(page.contains("class=\"dark\""));
}

#[tokio::test]
async fn rejecting_an_order_refunds_and_tells_the_customer() {
	let harness = signed_in().await;
	let id = seed_order(&harness.pool).await;

	let response = post_form(
		&harness.client,
		format!("/orders/{}/update", id),
		"action=status&status=REJECTED",
	)
	.await;
	assert_eq!(location(&response), format!("/orders/{}", id));

	let mut conn = harness.pool.acquire().await.unwrap();
	assert_eq!(wallet::balance(&mut conn, 7).await.unwrap(), 5_000);
	let order = orders::require_order(&mut conn, id).await.unwrap();
	assert_eq!(order.status, OrderStatus::Rejected);
	drop(conn);

	let sent = harness.notifier.user_messages(7);
	assert_eq!(sent.len(), 1);
	assert!(sent[0].contains("was rejected"));
	assert!(sent[0].contains("3،000 Toman was returned"));

	let page = harness
		.client
		.get(format!("/orders/{}", id))
		.dispatch()
		.await
		.into_string()
		.await
		.unwrap();
	assert!(page.contains("refunded to the wallet"));
}

#[tokio::test]
async fn manager_notes_must_not_be_empty() {
	let harness = signed_in().await;
	let id = seed_order(&harness.pool).await;
	post_form(
		&harness.client,
		format!("/orders/{}/update", id),
		"action=manager_note&manager_note=%20",
	)
	.await;
	assert!(harness.notifier.take().is_empty());

	post_form(
		&harness.client,
		format!("/orders/{}/update", id),
		"action=manager_note&manager_note=Login+details+sent",
	)
	.await;
	let mut conn = harness.pool.acquire().await.unwrap();
	let order = orders::require_order(&mut conn, id).await.unwrap();
	assert_eq!(order.manager_note.as_deref(), Some("Login details sent"));
	assert_eq!(messages::list_order_messages(&mut conn, id).await.unwrap().len(), 1);
	drop(conn);
	let sent = harness.notifier.user_messages(7);
	assert_eq!(sent.len(), 1);
	assert!(sent[0].contains("Login details sent"));
}

#[tokio::test]
async fn receipts_are_proxied_from_telegram() {
	let harness = signed_in().await;
	let id = seed_order(&harness.pool).await;
	let response = harness
		.client
		.get(format!("/orders/{}/receipt", id))
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::NotFound);

	let mut conn = harness.pool.acquire().await.unwrap();
	submit_receipt(&mut conn, id, 7, Some("photo-1"), None, None)
		.await
		.unwrap();
	drop(conn);
	let response = harness
		.client
		.get(format!("/orders/{}/receipt", id))
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::Ok);
	assert_eq!(response.content_type(), Some(ContentType::JPEG));
	assert_eq!(response.into_bytes().await.unwrap(), b"photo-1".to_vec());
}

#[tokio::test]
async fn wallet_adjustments_cannot_overdraw() {
	let harness = signed_in().await;
	seed_order(&harness.pool).await;

	post_form(
		&harness.client,
		"/users/7/wallet-adjust".to_owned(),
		"action=debit&amount=9000",
	)
	.await;
	let page = harness
		.client
		.get("/users/7")
		.dispatch()
		.await
		.into_string()
		.await
		.unwrap();
	assert!(page.contains("insufficient wallet balance"));
	assert!(harness.notifier.take().is_empty());

	post_form(
		&harness.client,
		"/users/7/wallet-adjust".to_owned(),
		"action=reserve&amount=1,500&note=Held",
	)
	.await;
	let mut conn = harness.pool.acquire().await.unwrap();
	assert_eq!(wallet::balance(&mut conn, 7).await.unwrap(), 500);
	drop(conn);
	let sent = harness.notifier.user_messages(7);
	assert_eq!(sent.len(), 1);
	assert!(sent[0].contains("1،500 Toman was deducted"));

	post_form(
		&harness.client,
		"/users/7/wallet-adjust".to_owned(),
		"action=credit&amount=0",
	)
	.await;
	assert_eq!(harness.notifier.user_messages(7).len(), 1);
}

#[tokio::test]
async fn blocking_notifies_the_user() {
	let harness = signed_in().await;
	seed_order(&harness.pool).await;
	post_form(&harness.client, "/users/7/block".to_owned(), "action=block").await;
	let mut conn = harness.pool.acquire().await.unwrap();
	assert!(users::is_blocked(&mut conn, 7).await.unwrap());
	drop(conn);
	assert_eq!(harness.notifier.take(), vec![Sent::User(7, crate::bot::texts::NOT_ALLOWED.to_owned())]);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
	let harness = signed_in().await;
	for uri in ["/orders/9999", "/users/9999", "/messages/9999", "/orders/9999/receipt"] {
		let response = harness.client.get(uri).dispatch().await;
		assert_eq!(response.status(), Status::NotFound, "{}", uri);
	}
	let response = harness.client.post("/coupons/9999/toggle").dispatch().await;
	assert_eq!(response.status(), Status::NotFound);
	let response = harness.client.post("/products/9999/delete").dispatch().await;
	assert_eq!(response.status(), Status::NotFound);
}

#[tokio::test]
async fn listings_clamp_the_page() {
	let harness = signed_in().await;
	seed_order(&harness.pool).await;
	for uri in [
		"/orders?page=99",
		"/orders?status=BOGUS&q=plus&page=-4",
		"/users?q=buyer",
		"/messages?category=BUILD_BOT",
		"/wallet",
		"/coupons",
		"/discounts",
		"/products",
		"/dashboard",
	] {
		let response = harness.client.get(uri).dispatch().await;
		assert_eq!(response.status(), Status::Ok, "{}", uri);
	}
	let page = harness
		.client
		.get("/orders?page=99")
		.dispatch()
		.await
		.into_string()
		.await
		.unwrap();
	assert!(page.contains("Page 1 of 1"));
}

#[tokio::test]
async fn coupons_are_created_and_toggled() {
	let harness = signed_in().await;
	let response = post_form(
		&harness.client,
		"/coupons/create".to_owned(),
		"code=spring&amount=10000&usage_limit=&is_active=true",
	)
	.await;
	assert_eq!(location(&response), "/coupons");
	let page = harness
		.client
		.get("/coupons")
		.dispatch()
		.await
		.into_string()
		.await
		.unwrap();
	assert!(page.contains("Coupon SPRING created."));

	post_form(&harness.client, "/coupons/create".to_owned(), "code=spring&amount=500").await;
	let page = harness
		.client
		.get("/coupons")
		.dispatch()
		.await
		.into_string()
		.await
		.unwrap();
	assert!(page.contains("already exists"));
}

#[tokio::test]
async fn message_replies_reach_the_user() {
	let harness = signed_in().await;
	let mut conn = harness.pool.acquire().await.unwrap();
	users::ensure_user(&mut conn, 9, None, Some("Ali")).await.unwrap();
	let id = messages::create_service_message(
		&mut conn,
		&messages::NewServiceMessage {
			user_id: 9,
			username: None,
			first_name: Some("Ali".to_owned()),
			category: crate::store::types::ServiceCategory::BuildBot,
			text: "I need a bot".to_owned(),
			attachment_file_id: None,
		},
	)
	.await
	.unwrap();
	drop(conn);

	post_form(&harness.client, format!("/messages/{}/reply", id), "text=On+it").await;
	post_form(&harness.client, format!("/messages/{}/status", id), "action=resolve").await;
	let sent = harness.notifier.user_messages(9);
	assert_eq!(sent.len(), 1);
	assert!(sent[0].contains("On it"));

	let mut conn = harness.pool.acquire().await.unwrap();
	let message = messages::get_service_message(&mut conn, id)
		.await
		.unwrap()
		.unwrap();
	assert!(message.is_resolved);
	assert_eq!(messages::list_replies(&mut conn, id).await.unwrap()[0].admin_identifier, "boss");
	drop(conn);

	let response = harness
		.client
		.get(format!("/messages/{}/attachment", id))
		.dispatch()
		.await;
	assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn pager_clamps_into_range() {
	let pager = Pager::new(Some(9), 45, 20);
	assert_eq!((pager.page, pager.pages, pager.offset()), (3, 3, 40));
	assert_eq!((pager.prev, pager.next), (Some(2), None));
	let empty = Pager::new(Some(0), 0, 20);
	assert_eq!((empty.page, empty.pages, empty.offset()), (1, 1, 0));
	assert_eq!((empty.prev, empty.next), (None, None));
}

#[test]
fn query_strings_skip_blank_filters() {
	assert_eq!(query_string(&[("status", Some("")), ("q", None)]), "");
	assert_eq!(query_string(&[("status", Some("EXPIRED"))]), "status=EXPIRED&");
}

#[test]
fn template_filters_format_values() {
	let args = HashMap::new();
	assert_eq!(
		money_filter(&Value::from(1_250_000), &args).unwrap(),
		Value::String("1،250،000".to_owned())
	);
	assert!(money_filter(&Value::from("lots"), &args).is_err());
	assert_eq!(when_filter(&Value::Null, &args).unwrap(), Value::String("-".to_owned()));
	assert_eq!(
		note_filter(&Value::from("COUPON:WELCOME"), &args).unwrap(),
		Value::String("Coupon WELCOME".to_owned())
	);
	assert_eq!(note_filter(&Value::Null, &args).unwrap(), Value::String(String::new()));
}
