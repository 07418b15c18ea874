//! Terminal output helpers built on `colored`.

use colored::Colorize;
use skiff_broker::PeerState;

/// Section header: ">> Title" in cyan.
pub fn section(title: &str) {
    println!("  {} {}", ">>".bright_cyan().bold(), title.bold());
}

/// Key-value display: "  Label:       value".
pub fn kv(label: &str, value: &str) {
    println!("  {:<13}{}", format!("{label}:"), value);
}

pub fn success(msg: &str) {
    println!("  {} {}", "\u{2714}".bright_green(), msg);
}

pub fn hint(msg: &str) {
    println!("  {} {}", "hint:".dimmed(), msg.dimmed());
}

/// Red error + yellow "fix:" suggestion, on stderr.
pub fn error_with_fix(msg: &str, fix: &str) {
    eprintln!("  {} {}", "\u{2718}".bright_red(), msg.bright_red());
    eprintln!("    {} {}", "fix:".bright_yellow(), fix);
}

pub fn error(msg: &str) {
    eprintln!("  {} {}", "\u{2718}".bright_red(), msg.bright_red());
}

/// Peer state colored by health: up green, down yellow, closed dimmed.
pub fn state_label(state: PeerState) -> String {
    let text = format!("{state:<6}");
    match state {
        PeerState::Up => text.bright_green().to_string(),
        PeerState::Down => text.bright_yellow().to_string(),
        PeerState::Closed => text.dimmed().to_string(),
    }
}

pub fn blank() {
    println!();
}
