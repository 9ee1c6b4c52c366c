use colored::Colorize;

pub fn print_banner(title: &str, color: fn(&str) -> colored::ColoredString) {
    let border = "╔═══════════════════════════════════════════════════════════════╗";
    let bottom = "╚═══════════════════════════════════════════════════════════════╝";

    println!("{}", color(border));
    println!("{}", color(&format!("║{:^63}║", title)));
    println!("{}", color(bottom));
}

/// Startup banner with the daemon's placement underneath the title.
pub fn print_startup_banner(title: &str, zone: &str, account: &str) {
    print_banner(title, |s| s.cyan());
    println!("{}", format!("  zone {zone} · account {account}").dimmed());
}
