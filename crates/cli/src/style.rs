//! Shared styling helpers for CLI output.

use console::Style;

/// Green check mark followed by `msg`.
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Red cross followed by `msg`.
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Yellow warning sign followed by `msg`.
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// A numbered step heading for the directory tester.
pub fn step(n: usize, msg: &str) -> String {
    let style = Style::new().cyan().bold();
    format!("{} {}", style.apply_to(format!("[{n}]")), msg)
}

/// Enabled/disabled indicator for account listings.
pub fn enabled(on: bool) -> String {
    if on {
        Style::new().green().apply_to("● enabled").to_string()
    } else {
        Style::new().dim().apply_to("○ disabled").to_string()
    }
}
