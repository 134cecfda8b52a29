//! Startup environment.
//!
//! Read exactly once at startup; nothing here is re-read while the editor
//! runs.

use std::path::PathBuf;

/// Environment-derived settings.
#[derive(Debug, Clone)]
pub struct Env {
	pub font: Option<String>,
	pub alt_font: Option<String>,
	pub tab_width: usize,
	pub home: PathBuf,
	pub foreground: Option<String>,
	pub background: Option<String>,
	pub background_image: Option<PathBuf>,
	/// Selection-service root; a `-m` flag overrides it.
	pub mount: Option<PathBuf>,
}

pub const DEFAULT_TAB_WIDTH: usize = 4;

impl Env {
	pub fn load() -> Self {
		let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
		Self {
			font: var("SCRIV_FONT"),
			alt_font: var("SCRIV_ALTFONT"),
			tab_width: tab_width_from(var("SCRIV_TAB").as_deref()),
			home: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
			foreground: var("SCRIV_FG"),
			background: var("SCRIV_BG"),
			background_image: var("SCRIV_BGIMAGE").map(PathBuf::from),
			mount: var("SCRIV_MOUNT").map(PathBuf::from),
		}
	}
}

fn tab_width_from(raw: Option<&str>) -> usize {
	match raw.map(str::parse::<usize>) {
		Some(Ok(n)) if n > 0 => n,
		Some(_) => {
			tracing::warn!(value = ?raw, "config.bad_tab_width");
			DEFAULT_TAB_WIDTH
		}
		None => DEFAULT_TAB_WIDTH,
	}
}
