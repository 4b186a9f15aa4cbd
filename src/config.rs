use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::*;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("`{0}` must be set")]
	Missing(&'static str),
	#[error("`{name}` has an invalid value `{value}`: {reason}")]
	Invalid {
		name: &'static str,
		value: String,
		reason: String,
	},
	#[error("failed loading env file `{path}`: {source}")]
	EnvFile {
		path: PathBuf,
		source: dotenvy::Error,
	},
}

#[derive(Clone, Debug)]
pub struct BotSettings {
	pub token: Option<String>,
	pub admin_ids: Vec<i64>,
}

impl BotSettings {
	pub fn is_admin(&self, user_id: i64) -> bool {
		self.admin_ids.contains(&user_id)
	}

	pub fn require_token(&self) -> Result<&str, ConfigError> {
		self.token.as_deref().ok_or(ConfigError::Missing("BOT_TOKEN"))
	}
}

#[derive(Clone, Debug)]
pub struct ShopSettings {
	/// Shown in the welcome message. **(default: `Premium Shop`)**
	pub business_name: String,
	pub card_number: String,
	pub card_name: String,
	/// Without the leading `@`.
	pub support_username: Option<String>,
	/// **(default: `Toman`)**
	pub currency: String,
	/// Promised delivery window in hours. **(default: `1` to `4`)**
	pub sla_hours_min: u32,
	pub sla_hours_max: u32,
	/// Minutes an unpaid order stays in the cart. **(default: `15`)**
	pub payment_timeout_min: u32,
	/// Lowest id a new order gets. **(default: `0`, no floor)**
	pub order_id_min_value: i64,
	pub required_channel_id: Option<String>,
	pub required_channel_link: Option<String>,
	pub force_join_message: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseSettings {
	/// **(default: `data.db`)**
	pub path: PathBuf,
	/// **(default: `5`)**
	pub max_connections: u32,
}

#[derive(Clone, Debug)]
pub struct AdminWebSettings {
	/// **(default: `admin`)**
	pub user: String,
	/// **(default: `admin`)**
	pub pass: String,
	/// **(default: `127.0.0.1`)**
	pub bind: IpAddr,
	/// **(default: `8080`)**
	pub port: u16,
	/// Key material for the private session cookies.
	pub secret: String,
	pub template_dir: PathBuf,
	/// Set when either credential fell back to its default.
	pub default_credentials: bool,
}

#[derive(Clone, Debug)]
pub struct LogSettings {
	/// **(default: `logs/bot.log`)**
	pub file: PathBuf,
	pub config: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct Settings {
	pub bot: BotSettings,
	pub shop: ShopSettings,
	pub database: DatabaseSettings,
	pub admin_web: AdminWebSettings,
	pub log: LogSettings,
}

const DEFAULT_FORCE_JOIN_MESSAGE: &str =
	"To use the bot please join our channel first, then press \"I joined\".";

/// Reads settings through a variable lookup, empty values count as unset.
struct Reader<F> {
	lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Reader<F> {
	fn string(&self, name: &'static str) -> Option<String> {
		(self.lookup)(name)
			.map(|v| v.trim().to_owned())
			.filter(|v| !v.is_empty())
	}

	/// Credentials keep their surrounding whitespace, a blank value is still unset.
	fn credential(&self, name: &'static str) -> Option<String> {
		(self.lookup)(name).filter(|v| !v.trim().is_empty())
	}

	fn string_or(&self, name: &'static str, default: &str) -> String {
		self.string(name).unwrap_or_else(|| default.to_owned())
	}

	fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
	where
		T: FromStr,
		T::Err: std::fmt::Display,
	{
		match self.string(name) {
			None => Ok(default),
			Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
				name,
				reason: e.to_string(),
				value,
			}),
		}
	}

	fn id_list(&self, name: &'static str) -> Result<Vec<i64>, ConfigError> {
		let raw = match self.string(name) {
			None => return Ok(Vec::new()),
			Some(raw) => raw,
		};
		raw.split(',')
			.map(str::trim)
			.filter(|part| !part.is_empty())
			.map(|part| {
				part.parse::<i64>().map_err(|e| ConfigError::Invalid {
					name,
					value: part.to_owned(),
					reason: e.to_string(),
				})
			})
			.collect()
	}
}

impl Settings {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let env = Reader { lookup };

		let token = env.string("BOT_TOKEN");
		let bot = BotSettings {
			admin_ids: env.id_list("ADMIN_IDS")?,
			token,
		};

		let shop = ShopSettings {
			business_name: env.string_or("BUSINESS_NAME", "Premium Shop"),
			card_number: env.string_or("CARD_NUMBER", ""),
			card_name: env.string_or("CARD_NAME", ""),
			support_username: env
				.string("SUPPORT_USERNAME")
				.map(|name| name.trim_start_matches('@').to_owned())
				.filter(|name| !name.is_empty()),
			currency: env.string_or("CURRENCY", "Toman"),
			sla_hours_min: env.parsed("SLA_HOURS_MIN", 1)?,
			sla_hours_max: env.parsed("SLA_HOURS_MAX", 4)?,
			payment_timeout_min: env.parsed("PAYMENT_TIMEOUT_MIN", 15)?,
			order_id_min_value: env.parsed("ORDER_ID_MIN_VALUE", 0)?,
			required_channel_id: env.string("REQUIRED_CHANNEL_ID"),
			required_channel_link: env.string("REQUIRED_CHANNEL_LINK"),
			force_join_message: env.string_or("FORCE_JOIN_MESSAGE", DEFAULT_FORCE_JOIN_MESSAGE),
		};

		let database = DatabaseSettings {
			path: PathBuf::from(env.string_or("DB_PATH", "data.db")),
			max_connections: env.parsed("DB_MAX_CONNECTIONS", 5)?,
		};

		let user = env.credential("ADMIN_WEB_USER");
		let pass = env.credential("ADMIN_WEB_PASS");
		let secret = env.credential("ADMIN_WEB_SECRET").unwrap_or_else(|| {
			let reversed: String = bot.token.as_deref().unwrap_or("").chars().rev().collect();
			format!("{}_secret", reversed)
		});
		let admin_web = AdminWebSettings {
			default_credentials: user.is_none() || pass.is_none(),
			user: user.unwrap_or_else(|| "admin".to_owned()),
			pass: pass.unwrap_or_else(|| "admin".to_owned()),
			bind: env.parsed("ADMIN_WEB_BIND", IpAddr::from([127, 0, 0, 1]))?,
			port: env.parsed("ADMIN_WEB_PORT", 8080)?,
			secret,
			template_dir: env
				.string("ADMIN_WEB_TEMPLATES")
				.map(PathBuf::from)
				.unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))),
		};

		let log = LogSettings {
			file: PathBuf::from(env.string_or("LOG_FILE", "logs/bot.log")),
			config: env.string("LOG_CONFIG").map(PathBuf::from),
		};

		Ok(Settings {
			bot,
			shop,
			database,
			admin_web,
			log,
		})
	}

	/// Logs the settings that are legal but probably a mistake.
	pub fn warn_questionable(&self) {
		if self.admin_web.default_credentials {
			warn!("ADMIN_WEB_USER or ADMIN_WEB_PASS is not set, the admin panel uses default credentials");
		}
		if self.bot.token.is_none() {
			warn!("BOT_TOKEN is not set, users cannot be notified");
		}
		if self.shop.sla_hours_min > self.shop.sla_hours_max {
			warn!(
				"SLA_HOURS_MIN ({}) is above SLA_HOURS_MAX ({})",
				self.shop.sla_hours_min, self.shop.sla_hours_max
			);
		}
	}
}

/// Loads `path`, or a `.env` from the working directory or its parents when none is given.
///
/// A missing default `.env` is fine, a missing explicit file is not.
pub fn load_env_file(path: Option<&Path>) -> Result<(), ConfigError> {
	match path {
		Some(path) => dotenvy::from_path(path)
			.map(|_| ())
			.map_err(|source| ConfigError::EnvFile {
				path: path.to_owned(),
				source,
			}),
		None => match dotenvy::dotenv() {
			Ok(_) => Ok(()),
			Err(e) if e.not_found() => Ok(()),
			Err(source) => Err(ConfigError::EnvFile {
				path: PathBuf::from(".env"),
				source,
			}),
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::sync::Mutex;

	/// Serializes the tests that touch the process environment.
	static ENV_LOCK: Mutex<()> = Mutex::new(());

	fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		Settings::from_lookup(move |name| vars.get(name).cloned())
	}

	#[test]
	fn defaults_apply_when_unset() {
		let settings = settings(&[]).unwrap();
		assert_eq!(settings.admin_web.port, 8080);
		assert_eq!(settings.admin_web.bind.to_string(), "127.0.0.1");
		assert_eq!(settings.admin_web.user, "admin");
		assert!(settings.admin_web.default_credentials);
		assert_eq!(settings.shop.business_name, "Premium Shop");
		assert_eq!(settings.shop.payment_timeout_min, 15);
		assert_eq!(settings.database.path, PathBuf::from("data.db"));
		assert_eq!(settings.log.file, PathBuf::from("logs/bot.log"));
		assert!(settings.bot.admin_ids.is_empty());
		assert!(settings.bot.require_token().is_err());
	}

	#[test]
	fn values_are_parsed_and_trimmed() {
		let settings = settings(&[
			("BOT_TOKEN", "123:abc"),
			("ADMIN_IDS", " 11, ,22 "),
			("ADMIN_WEB_PORT", "9090"),
			("ADMIN_WEB_BIND", "0.0.0.0"),
			("ADMIN_WEB_USER", "boss"),
			("ADMIN_WEB_PASS", "hunter2"),
			("SUPPORT_USERNAME", "@helpdesk"),
			("ORDER_ID_MIN_VALUE", "1000"),
			("CURRENCY", ""),
		])
		.unwrap();
		assert_eq!(settings.bot.admin_ids, vec![11, 22]);
		assert!(settings.bot.is_admin(22));
		assert_eq!(settings.admin_web.port, 9090);
		assert!(!settings.admin_web.default_credentials);
		assert_eq!(settings.admin_web.secret, "cba:321_secret");
		assert_eq!(settings.shop.support_username.as_deref(), Some("helpdesk"));
		assert_eq!(settings.shop.order_id_min_value, 1000);
		assert_eq!(settings.shop.currency, "Toman");
	}

	#[test]
	fn credentials_are_read_verbatim() {
		let spaced = settings(&[
			("ADMIN_WEB_USER", "boss"),
			("ADMIN_WEB_PASS", "  s3cret "),
			("ADMIN_WEB_SECRET", " key"),
		])
		.unwrap();
		assert_eq!(spaced.admin_web.pass, "  s3cret ");
		assert_eq!(spaced.admin_web.secret, " key");
		assert!(!spaced.admin_web.default_credentials);

		let blank = settings(&[("ADMIN_WEB_USER", "boss"), ("ADMIN_WEB_PASS", "   ")]).unwrap();
		assert_eq!(blank.admin_web.pass, "admin");
		assert!(blank.admin_web.default_credentials);
	}

	#[test]
	fn invalid_values_name_the_variable() {
		let err = settings(&[("ADMIN_WEB_PORT", "eighty")]).unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "ADMIN_WEB_PORT", .. }));
		let err = settings(&[("ADMIN_IDS", "1,two")]).unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "ADMIN_IDS", ref value, .. } if value == "two"));
		let err = settings(&[("ADMIN_WEB_BIND", "localhost")]).unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "ADMIN_WEB_BIND", .. }));
	}

	#[test]
	fn reads_the_process_environment() {
		let _guard = ENV_LOCK.lock().unwrap();
		std::env::set_var("ADMIN_WEB_PORT", "8181");
		std::env::set_var("BUSINESS_NAME", "Env Shop");
		let settings = Settings::from_env();
		std::env::remove_var("ADMIN_WEB_PORT");
		std::env::remove_var("BUSINESS_NAME");
		let settings = settings.unwrap();
		assert_eq!(settings.admin_web.port, 8181);
		assert_eq!(settings.shop.business_name, "Env Shop");
	}
}
