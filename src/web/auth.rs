//! The single admin login.
//!
//! The configured password is hashed once when the panel starts, a successful login issues a
//! private cookie naming a server side session that lives for twelve hours.

use crate::web::{Chrome, PageResult};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use dashmap::DashMap;
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar, RawStr, SameSite, Status};
use rocket::outcome::{try_outcome, IntoOutcome};
use rocket::request::{FromRequest, Outcome};
use rocket::response::{Flash, Redirect};
use rocket::{Request, State};
use rocket_dyn_templates::{context, Template};
use std::time::{Duration, Instant};
use tracing::*;
use uuid::Uuid;

pub const COOKIE_SESSION: &str = "admin_session";
pub const COOKIE_THEME: &str = "theme";
pub const SESSION_LIFETIME: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum AdminAuthError {
	#[error("unable to hash the admin password: {0}")]
	Hash(String),
}

pub struct AdminCredentials {
	user: String,
	password_hash: String,
}

impl AdminCredentials {
	pub fn new(user: &str, password: &str) -> Result<Self, AdminAuthError> {
		let salt = SaltString::generate(&mut OsRng);
		let password_hash = Argon2::default()
			.hash_password(password.as_bytes(), &salt)
			.map_err(|e| AdminAuthError::Hash(e.to_string()))?
			.to_string();
		Ok(Self {
			user: user.to_owned(),
			password_hash,
		})
	}

	pub fn verify(&self, user: &str, password: &str) -> bool {
		if user != self.user {
			return false;
		}
		match PasswordHash::new(&self.password_hash) {
			Ok(hash) => Argon2::default()
				.verify_password(password.as_bytes(), &hash)
				.is_ok(),
			Err(e) => {
				error!("Stored admin password hash is unreadable: {}", e);
				false
			}
		}
	}

	pub fn user(&self) -> &str {
		&self.user
	}
}

/// Live sessions keyed by the id stored in the cookie.
pub struct Sessions {
	lifetime: Duration,
	started: DashMap<Uuid, Instant>,
}

impl Default for Sessions {
	fn default() -> Self {
		Self::with_lifetime(SESSION_LIFETIME)
	}
}

impl Sessions {
	pub fn with_lifetime(lifetime: Duration) -> Self {
		Self {
			lifetime,
			started: DashMap::new(),
		}
	}

	pub fn create(&self) -> Uuid {
		let now = Instant::now();
		self.started
			.retain(|_, started| now.duration_since(*started) < self.lifetime);
		let id = Uuid::new_v4();
		self.started.insert(id, now);
		id
	}

	pub fn is_valid(&self, id: &Uuid) -> bool {
		let started = match self.started.get(id) {
			Some(started) => *started,
			None => return false,
		};
		if started.elapsed() < self.lifetime {
			true
		} else {
			self.started.remove(id);
			false
		}
	}

	pub fn remove(&self, id: &Uuid) {
		self.started.remove(id);
	}
}

/// Present on every request made with a live admin session.
#[derive(Debug)]
pub struct AdminSession {
	pub id: Uuid,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminSession {
	type Error = ();

	async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
		let sessions = try_outcome!(request
			.rocket()
			.state::<Sessions>()
			.or_error((Status::InternalServerError, ())));
		let cookie = try_outcome!(request
			.cookies()
			.get_private(COOKIE_SESSION)
			.or_error((Status::Unauthorized, ())));
		let id = try_outcome!(cookie
			.value()
			.parse::<Uuid>()
			.ok()
			.or_error((Status::Unauthorized, ())));
		if sessions.is_valid(&id) {
			Outcome::Success(Self { id })
		} else {
			Outcome::Error((Status::Unauthorized, ()))
		}
	}
}

/// Only same site paths are followed after a login, anything else lands on the dashboard.
pub fn local_next(next: Option<&str>) -> String {
	match next {
		Some(next)
			if next.starts_with('/')
				&& !next.starts_with("//")
				&& !next.contains('\\')
				&& !next.starts_with("/login") =>
		{
			next.to_owned()
		}
		_ => "/dashboard".to_owned(),
	}
}

#[rocket::catch(401)]
pub fn unauthorized(request: &Request<'_>) -> Redirect {
	let next = request.uri().to_string();
	Redirect::to(format!(
		"/login?next={}",
		RawStr::new(&next).percent_encode()
	))
}

#[rocket::get("/login?<next>")]
pub fn login_page(next: Option<&str>, chrome: Chrome) -> PageResult {
	Ok(Template::render(
		"login",
		context! {
			layout: chrome.layout("Sign in", ""),
			next: local_next(next),
		},
	))
}

#[derive(rocket::FromForm)]
pub struct LoginForm<'r> {
	username: &'r str,
	password: &'r str,
	next: Option<&'r str>,
}

#[rocket::post("/login", data = "<form>")]
pub fn login(
	form: Form<LoginForm<'_>>,
	credentials: &State<AdminCredentials>,
	sessions: &State<Sessions>,
	cookies: &CookieJar<'_>,
) -> Result<Redirect, Flash<Redirect>> {
	let next = local_next(form.next);
	if !credentials.verify(form.username.trim(), form.password) {
		warn!("Failed admin panel login for `{}`", form.username);
		return Err(Flash::error(
			Redirect::to(format!("/login?next={}", RawStr::new(&next).percent_encode())),
			"Invalid username or password.",
		));
	}
	let id = sessions.create();
	cookies.add_private(
		Cookie::build((COOKIE_SESSION, id.to_string()))
			.http_only(true)
			.same_site(SameSite::Strict)
			.max_age(rocket::time::Duration::seconds(SESSION_LIFETIME.as_secs() as i64)),
	);
	info!("Admin `{}` signed in to the panel", credentials.user());
	Ok(Redirect::to(next))
}

#[rocket::post("/logout")]
pub fn logout(session: AdminSession, sessions: &State<Sessions>, cookies: &CookieJar<'_>) -> Flash<Redirect> {
	sessions.remove(&session.id);
	cookies.remove_private(COOKIE_SESSION);
	Flash::success(Redirect::to("/login"), "Signed out.")
}

#[derive(rocket::FromForm)]
pub struct ThemeForm<'r> {
	next: Option<&'r str>,
}

#[rocket::post("/toggle-theme", data = "<form>")]
pub fn toggle_theme(
	_session: AdminSession,
	form: Form<ThemeForm<'_>>,
	cookies: &CookieJar<'_>,
) -> Redirect {
	let dark = cookies.get(COOKIE_THEME).map_or(false, |c| c.value() == "dark");
	let theme = if dark { "light" } else { "dark" };
	cookies.add(
		Cookie::build((COOKIE_THEME, theme))
			.same_site(SameSite::Lax)
			.permanent(),
	);
	Redirect::to(local_next(form.next))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn credentials_check_user_and_password() {
		let credentials = AdminCredentials::new("admin", "hunter2").unwrap();
		assert!(credentials.verify("admin", "hunter2"));
		assert!(!credentials.verify("admin", "hunter3"));
		assert!(!credentials.verify("root", "hunter2"));
	}

	#[test]
	fn sessions_expire() {
		let sessions = Sessions::with_lifetime(Duration::from_secs(60));
		let id = sessions.create();
		assert!(sessions.is_valid(&id));
		sessions.remove(&id);
		assert!(!sessions.is_valid(&id));

		let short = Sessions::with_lifetime(Duration::ZERO);
		let id = short.create();
		assert!(!short.is_valid(&id));
	}

	#[test]
	fn only_local_paths_are_followed() {
		assert_eq!(local_next(Some("/orders/5")), "/orders/5");
		assert_eq!(local_next(Some("//evil.example")), "/dashboard");
		assert_eq!(local_next(Some("https://evil.example")), "/dashboard");
		assert_eq!(local_next(Some("/\\evil")), "/dashboard");
		assert_eq!(local_next(Some("/login")), "/dashboard");
		assert_eq!(local_next(None), "/dashboard");
	}
}
