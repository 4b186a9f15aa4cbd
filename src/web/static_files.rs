use rocket::http::ContentType;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

#[derive(rocket::Responder)]
pub struct StaticFile {
	pub data: Cow<'static, [u8]>,
	pub content_type: ContentType,
}

#[derive(rust_embed::RustEmbed)]
#[folder = "assets/web/"]
pub struct StaticAssets;

impl StaticAssets {
	pub fn file(file_path: &str) -> Option<StaticFile> {
		// Loaded from disk in debug builds, embedded in release ones
		let asset = Self::get(file_path)?;
		let content_type = Path::new(file_path)
			.extension()
			.and_then(|e| e.to_str())
			.and_then(ContentType::from_extension)
			.unwrap_or(ContentType::Binary);
		Some(StaticFile {
			data: asset.data,
			content_type,
		})
	}
}

/// Stylesheets and icons, the only routes reachable without a session besides the login.
#[rocket::get("/static/<path..>")]
pub fn static_file(path: PathBuf) -> Option<StaticFile> {
	// Asset names are utf-8 only
	let path = path.to_str()?;
	StaticAssets::file(path)
}
