//! Cross-platform console symbols
//!
//! ASCII fallbacks on Windows consoles.

/// Checkmark symbol
#[cfg(windows)]
pub const CHECK: &str = "[OK]";
#[cfg(not(windows))]
pub const CHECK: &str = "\u{2713}";

/// Cross/error symbol
#[cfg(windows)]
pub const CROSS: &str = "[X]";
#[cfg(not(windows))]
pub const CROSS: &str = "\u{2717}";

/// Warning symbol
#[cfg(windows)]
pub const WARN: &str = "[!]";
#[cfg(not(windows))]
pub const WARN: &str = "!";

/// Folder marker in listings
#[cfg(windows)]
pub const FOLDER: &str = "[D]";
#[cfg(not(windows))]
pub const FOLDER: &str = "\u{1F4C1}";

/// Horizontal rule for table headers
#[cfg(windows)]
pub const HLINE: &str = "-";
#[cfg(not(windows))]
pub const HLINE: &str = "\u{2500}";
