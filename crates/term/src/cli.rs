use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "scriv")]
#[command(about = "A tiling text editor that runs and monitors commands")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Number of columns at startup
	#[arg(short = 'c', default_value_t = 2, value_parser = parse_columns)]
	pub columns: usize,

	/// Main font
	#[arg(short = 'f')]
	pub font: Option<String>,

	/// Alternate fixed-width font
	#[arg(short = 'F')]
	pub alt_font: Option<String>,

	/// Restore a previously saved state snapshot
	#[arg(short = 'l')]
	pub load: Option<PathBuf>,

	/// Mount point of the selection service
	#[arg(short = 'm')]
	pub mount: Option<PathBuf>,

	/// Port name to announce on the message bus
	#[arg(short = 'p')]
	pub port: Option<String>,

	/// Swap scroll-button handedness
	#[arg(short = 'r')]
	pub swap_scroll: bool,

	/// Auto-indent on newline
	#[arg(short = 'a')]
	pub auto_indent: bool,

	/// Expand window tags to their full width
	#[arg(short = 'b')]
	pub wide_tags: bool,

	/// Start without an initial window
	#[arg(short = 'e')]
	pub start_empty: bool,

	/// Initial window geometry, WIDTHxHEIGHT in pixels
	#[arg(short = 'W', value_parser = parse_geometry)]
	pub geometry: Option<(i32, i32)>,

	/// Files to open
	pub files: Vec<PathBuf>,
}

fn parse_columns(raw: &str) -> Result<usize, String> {
	match raw.parse::<usize>() {
		Ok(n) if n > 0 => Ok(n),
		_ => Err(format!("column count must be a positive integer, got {raw:?}")),
	}
}

fn parse_geometry(raw: &str) -> Result<(i32, i32), String> {
	let err = || format!("geometry must look like 800x600, got {raw:?}");
	let (w, h) = raw.split_once('x').ok_or_else(err)?;
	let w: i32 = w.parse().map_err(|_| err())?;
	let h: i32 = h.parse().map_err(|_| err())?;
	if w <= 0 || h <= 0 {
		return Err(err());
	}
	Ok((w, h))
}
