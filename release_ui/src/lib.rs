use rust_embed::RustEmbed;

/// Static download page. `index.html` is the entry point; the script drives
/// everything else from the JSON API.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Assets;
