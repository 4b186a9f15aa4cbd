pub mod auth;
pub mod coupons;
pub mod dashboard;
pub mod discounts;
pub mod messages;
pub mod orders;
pub mod products;
pub mod static_files;
pub mod users;
pub mod wallet;

#[cfg(test)]
mod tests;

use crate::config::{AdminWebSettings, Settings};
use crate::database::DbPool;
use crate::notify::{FetchedFile, Notifier};
use crate::store::types::{display_timestamp, display_wallet_note, format_amount};
use crate::store::StoreError;
use crate::system::QuitOnError;
use crate::web::auth::{AdminCredentials, Sessions, COOKIE_THEME};
use rocket::config::{LogLevel, SecretKey};
use rocket::figment::Figment;
use rocket::http::{ContentType, RawStr, Status};
use rocket::request::{FlashMessage, FromRequest, Outcome};
use rocket::response::{Flash, Redirect};
use rocket::{Build, Request, Rocket, Route};
use rocket_dyn_templates::tera::{self, Value};
use rocket_dyn_templates::{Engines, Template};
use sha2::{Digest, Sha512};
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;
use std::collections::HashMap;
use std::fmt::Display;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::*;

pub struct WebConfig {
	/// Root path, useful to change if hosted at a non root URL, **(default: "/")**
	pub url_root: String,
	/// IP address to serve on. **(default: `127.0.0.1`)**
	pub address: IpAddr,
	/// Port to serve on. **(default: `8080`)**
	pub port: u16,
	/// Signs and encrypts the session cookie, derived from `ADMIN_WEB_SECRET`.
	pub secret_key: SecretKey,
	/// Where the tera page templates are read from.
	pub template_dir: PathBuf,
	/// Max level rocket itself logs at. **(default: `critical`)**
	pub log_level: LogLevel,
}

impl WebConfig {
	pub fn from_settings(settings: &AdminWebSettings) -> Self {
		Self {
			url_root: "/".to_owned(),
			address: settings.bind,
			port: settings.port,
			secret_key: Self::secret_key_from(&settings.secret),
			template_dir: settings.template_dir.clone(),
			log_level: LogLevel::Critical,
		}
	}

	/// Rocket wants 64 bytes of key material, which is exactly a SHA-512 digest.
	pub fn secret_key_from(secret: &str) -> SecretKey {
		let digest = Sha512::digest(secret.as_bytes());
		SecretKey::from(&digest[..])
	}

	pub fn rocket_config(&self) -> rocket::Config {
		rocket::Config {
			address: self.address,
			port: self.port,
			secret_key: self.secret_key.clone(),
			log_level: self.log_level,
			shutdown: rocket::config::Shutdown {
				// `ctrlc` is already handled by the daemon task
				ctrlc: false,
				..Default::default()
			},
			cli_colors: false,
			..Default::default()
		}
	}

	fn figment(&self) -> Figment {
		Figment::from(self.rocket_config()).merge(("template_dir", &self.template_dir))
	}
}

/// What every handler needs besides the database.
pub struct Panel {
	pub settings: Arc<Settings>,
	pub notifier: Arc<dyn Notifier>,
}

impl Panel {
	pub fn currency(&self) -> &str {
		&self.settings.shop.currency
	}

	/// Messages a customer, returns whether it reached them.
	pub async fn tell(&self, user_id: i64, html: &str) -> bool {
		match self.notifier.notify_user(user_id, html).await {
			Ok(()) => true,
			Err(e) => {
				warn!("Could not notify user {} from the admin panel: {}", user_id, e);
				false
			}
		}
	}

	pub async fn fetch(&self, file_id: &str) -> Result<(ContentType, Vec<u8>), Status> {
		let FetchedFile { data, mime } = self.notifier.fetch_file(file_id).await.map_err(|e| {
			warn!("Telegram file {} could not be fetched: {}", file_id, e);
			Status::BadGateway
		})?;
		let content_type = mime
			.as_deref()
			.and_then(ContentType::parse_flexible)
			.unwrap_or(ContentType::Binary);
		Ok((content_type, data))
	}
}

pub type PageResult = Result<Template, Status>;
pub type ActionResult = Result<Flash<Redirect>, Status>;

pub(crate) fn internal(e: impl Display) -> Status {
	error!("Admin panel request failed: {}", e);
	Status::InternalServerError
}

pub(crate) async fn connection(pool: &DbPool) -> Result<PoolConnection<Sqlite>, Status> {
	pool.acquire().await.map_err(internal)
}

/// Missing records are a 404, storage failures a 500, and anything the admin can fix goes
/// back to `back` as an error flash.
pub(crate) fn refused(e: StoreError, back: impl Into<String>) -> ActionResult {
	match e {
		StoreError::Database(e) => Err(internal(e)),
		StoreError::UserNotFound(_)
		| StoreError::OrderNotFound(_)
		| StoreError::ProductNotFound(_)
		| StoreError::MessageNotFound(_)
		| StoreError::CouponNotFound(_)
		| StoreError::DiscountNotFound(_) => Err(Status::NotFound),
		other => Ok(Flash::error(Redirect::to(back.into()), other.to_string())),
	}
}

pub(crate) fn missing(e: StoreError) -> Status {
	match e {
		StoreError::Database(e) => internal(e),
		_ => Status::NotFound,
	}
}

pub(crate) fn done(back: impl Into<String>, message: impl Into<String>) -> ActionResult {
	Ok(Flash::success(Redirect::to(back.into()), message.into()))
}

pub(crate) fn failed(back: impl Into<String>, message: impl Into<String>) -> ActionResult {
	Ok(Flash::error(Redirect::to(back.into()), message.into()))
}

/// Empty form fields count as absent.
pub(crate) fn filled(value: Option<&str>) -> Option<&str> {
	value.map(str::trim).filter(|v| !v.is_empty())
}

/// Builds a query string from the present filters, for pager links.
pub(crate) fn query_string(pairs: &[(&str, Option<&str>)]) -> String {
	pairs
		.iter()
		.filter_map(|(name, value)| {
			filled(*value).map(|value| format!("{}={}&", name, RawStr::new(value).percent_encode()))
		})
		.collect()
}

#[derive(Debug, PartialEq, Eq, serde::Serialize)]
pub struct Pager {
	pub page: i64,
	pub pages: i64,
	pub total: i64,
	pub prev: Option<i64>,
	pub next: Option<i64>,
	#[serde(skip)]
	per_page: i64,
}

impl Pager {
	/// Clamps the requested page into `1..=pages`, an empty listing still has one page.
	pub fn new(requested: Option<i64>, total: i64, per_page: i64) -> Self {
		let pages = ((total + per_page - 1) / per_page).max(1);
		let page = requested.unwrap_or(1).clamp(1, pages);
		Self {
			page,
			pages,
			total,
			prev: (page > 1).then_some(page - 1),
			next: (page < pages).then_some(page + 1),
			per_page,
		}
	}

	pub fn limit(&self) -> i64 {
		self.per_page
	}

	pub fn offset(&self) -> i64 {
		(self.page - 1) * self.per_page
	}
}

#[derive(serde::Serialize)]
pub struct FlashView {
	pub kind: String,
	pub message: String,
}

#[derive(serde::Serialize)]
pub struct Layout {
	pub title: String,
	pub nav: &'static str,
	pub dark: bool,
	pub business_name: String,
	pub current: String,
	pub flash: Option<FlashView>,
}

/// The page furniture every template gets: theme, pending flash and where we are.
pub struct Chrome {
	dark: bool,
	business_name: String,
	current: String,
	flash: Option<FlashView>,
}

impl Chrome {
	pub fn layout(self, title: impl Into<String>, nav: &'static str) -> Layout {
		Layout {
			title: title.into(),
			nav,
			dark: self.dark,
			business_name: self.business_name,
			current: self.current,
			flash: self.flash,
		}
	}
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Chrome {
	type Error = ();

	async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
		let dark = request
			.cookies()
			.get(COOKIE_THEME)
			.map_or(false, |c| c.value() == "dark");
		let business_name = request
			.rocket()
			.state::<Panel>()
			.map(|panel| panel.settings.shop.business_name.clone())
			.unwrap_or_default();
		let flash = match request.guard::<Option<FlashMessage<'_>>>().await {
			Outcome::Success(Some(flash)) => Some(FlashView {
				kind: flash.kind().to_owned(),
				message: flash.message().to_owned(),
			}),
			_ => None,
		};
		Outcome::Success(Self {
			dark,
			business_name,
			current: request.uri().to_string(),
			flash,
		})
	}
}

fn money_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
	value
		.as_i64()
		.map(|amount| Value::String(format_amount(amount)))
		.ok_or_else(|| tera::Error::msg("`money` expects a whole number"))
}

fn when_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
	Ok(Value::String(match value.as_str() {
		Some(at) => display_timestamp(at),
		None => "-".to_owned(),
	}))
}

fn note_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
	Ok(Value::String(value.as_str().map(display_wallet_note).unwrap_or_default()))
}

fn register_filters(engines: &mut Engines) {
	engines.tera.register_filter("money", money_filter);
	engines.tera.register_filter("when", when_filter);
	engines.tera.register_filter("note", note_filter);
}

fn routes() -> Vec<Route> {
	let mut routes = rocket::routes![
		static_files::static_file,
		auth::login_page,
		auth::login,
		auth::logout,
		auth::toggle_theme,
	];
	routes.extend(dashboard::routes());
	routes.extend(orders::routes());
	routes.extend(users::routes());
	routes.extend(wallet::routes());
	routes.extend(coupons::routes());
	routes.extend(discounts::routes());
	routes.extend(products::routes());
	routes.extend(messages::routes());
	routes
}

pub fn build_rocket(
	config: &WebConfig,
	db_pool: DbPool,
	panel: Panel,
	credentials: AdminCredentials,
) -> Rocket<Build> {
	rocket::custom(config.figment())
		.attach(Template::custom(register_filters))
		.manage(db_pool)
		.manage(panel)
		.manage(credentials)
		.manage(Sessions::default())
		.register(&config.url_root, rocket::catchers![auth::unauthorized])
		.mount(&config.url_root, routes())
}

pub async fn runner(
	config: WebConfig,
	db_pool: DbPool,
	panel: Panel,
	credentials: AdminCredentials,
	quit: broadcast::Sender<()>,
) -> anyhow::Result<()> {
	info!("Building the admin web panel");
	let rocket = build_rocket(&config, db_pool, panel, credentials);

	info!("Igniting the admin web panel");
	let rocket = rocket.ignite().await.quit_on_err(&quit)?;
	let shutdown = rocket.shutdown();
	let mut on_quit = quit.subscribe();
	tokio::spawn(async move {
		let _ = on_quit.recv().await;
		info!("Shutdown requested, sending graceful shutdown request to the admin web panel");
		shutdown.notify();
	});

	info!(
		"Launching the admin web panel on http://{}:{}{}",
		config.address, config.port, config.url_root
	);
	rocket.launch().await.quit_on_err(&quit)?;

	info!("Admin web panel had a successful shutdown");
	let _ = quit.send(());
	Ok(())
}
