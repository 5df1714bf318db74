//! Embedded static assets: the demo capture page and the capture script.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "static/"]
pub struct Assets;
