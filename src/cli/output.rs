//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command. Diagnostics use `tracing`
//! instead — these helpers are the product surface.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::audit::AuditEntry;
use crate::store::SecretListing;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print a table of secret listings (Ref, UUID, Tags). Values never
/// appear here — listings don't carry them.
pub fn print_secrets_table(secrets: &[SecretListing]) {
    if secrets.is_empty() {
        info("No secrets in the store yet.");
        tip("Run `2kc secrets add <ref>` to add your first secret.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Ref", "UUID", "Tags"]);

    for s in secrets {
        table.add_row(vec![
            s.reference.clone(),
            s.uuid.clone(),
            s.tags.join(", "),
        ]);
    }

    println!("{table}");
}

/// Print a table of audit entries (Time, Request, Event, Details).
pub fn print_audit_table(entries: &[AuditEntry]) {
    if entries.is_empty() {
        info("No audit entries recorded yet.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Request", "Event", "Details"]);

    for e in entries {
        table.add_row(vec![
            e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            e.request_id.clone(),
            e.event.clone(),
            e.details.clone().unwrap_or_default(),
        ]);
    }

    println!("{table}");
}
