use log4rs::config::runtime::ConfigErrors;
use log4rs::config::{Config, Deserializers, RawConfig};
use std::path::{Path, PathBuf};
use tracing::log::SetLoggerError;

const LOG_FILE_PLACEHOLDER: &str = "%LOG_FILE%";
const LOG_ARCHIVE_PLACEHOLDER: &str = "%LOG_ARCHIVE%";

const DEFAULT_LOGGING_DEFINITION_RON: &str = r#"(
	// Default filter and appenders for anything not listed in `loggers`.
	root: (
		level: Info,
		appenders: ["console", "log_file"],
	),

	appenders: {
		"console": {
			"kind": "console",
			// `stdout` or `stderr`
			"target": "stderr",
			"encoder": {
				"kind": "pattern",
				"pattern": "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} | {m}{n}",
			},
		},
		"log_file": {
			"kind": "rolling_file",
			"path": "%LOG_FILE%",
			"encoder": {
				"kind": "pattern",
				"pattern": "{d(%Y-%m-%d %H:%M:%S)} {l} {t} | {m}{n}",
			},
			"policy": {
				"kind": "compound",
				// Roll once the current file grows past the limit.
				"trigger": {
					"kind": "size",
					"limit": "10 mb",
				},
				// `{}` is replaced by the archive index, the oldest is dropped past `count`.
				"roller": {
					"kind": "fixed_window",
					"pattern": "%LOG_ARCHIVE%",
					"base": 1,
					"count": 12,
				},
			},
		},
	},

	loggers: {
		"tracing::span": (
			level: Info,
			appenders: [],
			additive: true,
		),
		"hyper": ( level: Warn ),
		"reqwest": ( level: Warn ),
		"sqlx": ( level: Warn ),
		"rustls": ( level: Warn ),
		"rocket": ( level: Warn ),
		"want": ( level: Warn ),
	},
)
"#;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("Unable to create log directory at: {0:?}")]
	CreateDirError(PathBuf, #[source] std::io::Error),
	#[error("Unable to write missing default log configuration at: {0:?}")]
	UnableToWriteDefaultConfig(PathBuf, #[source] std::io::Error),
	#[error("Unable to configure logging system")]
	ConfigFailure(#[from] ConfigErrors),
	#[error("Unable to initialize logging system from configuration")]
	ConfigurationInit(#[from] SetLoggerError),
	#[error("failed parsing configuration file in ron format")]
	RonParseFailure(#[from] ron::error::SpannedError),
	#[error("failed reading file")]
	FileReadFailure(#[from] std::io::Error),
}

/// The built-in configuration with the log file paths filled in.
pub fn default_definition(log_file: &Path) -> String {
	let archive = archive_pattern(log_file);
	DEFAULT_LOGGING_DEFINITION_RON
		.replace(LOG_FILE_PLACEHOLDER, &ron_escape(&log_file.to_string_lossy()))
		.replace(LOG_ARCHIVE_PLACEHOLDER, &ron_escape(&archive))
}

/// `logs/bot.log` rolls into `logs/bot.1.log`, `logs/bot.2.log` and so on.
fn archive_pattern(log_file: &Path) -> String {
	let stem = log_file
		.file_stem()
		.map(|s| s.to_string_lossy().into_owned())
		.unwrap_or_else(|| "log".to_owned());
	let name = match log_file.extension() {
		Some(ext) => format!("{}.{{}}.{}", stem, ext.to_string_lossy()),
		None => format!("{}.{{}}", stem),
	};
	log_file.with_file_name(name).to_string_lossy().into_owned()
}

fn ron_escape(value: &str) -> String {
	value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Starts log4rs, from `config_path` when given, writing the default there first if it is missing.
pub fn init_logging(config_path: Option<&Path>, log_file: &Path) -> Result<(), Error> {
	if let Some(dir) = log_file.parent().filter(|d| !d.as_os_str().is_empty()) {
		if !dir.is_dir() {
			std::fs::create_dir_all(dir).map_err(|e| Error::CreateDirError(dir.into(), e))?;
		}
	}
	let config = match config_path {
		Some(path) => {
			if !path.is_file() {
				if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
					std::fs::create_dir_all(dir).map_err(|e| Error::CreateDirError(dir.into(), e))?;
				}
				std::fs::write(path, default_definition(log_file))
					.map_err(|e| Error::UnableToWriteDefaultConfig(path.into(), e))?;
			}
			config_from_ron_file(path)?
		}
		None => config_from_ron_string(&default_definition(log_file))?,
	};
	log4rs::init_config(config)?;
	Ok(())
}

fn config_from_ron_file(ron_path: impl AsRef<Path>) -> Result<Config, Error> {
	let ron = std::fs::read_to_string(ron_path)?;
	config_from_ron_string(&ron).map_err(Into::into)
}

fn config_from_ron_string(ron: &str) -> Result<Config, ron::error::SpannedError> {
	let raw_config: RawConfig = ron::from_str(ron)?;

	let (appenders, mut errors) = raw_config.appenders_lossy(&Deserializers::default());
	errors.handle();

	let (config, mut errors) = Config::builder()
		.appenders(appenders)
		.loggers(raw_config.loggers())
		.build_lossy(raw_config.root());

	errors.handle();

	Ok(config)
}
