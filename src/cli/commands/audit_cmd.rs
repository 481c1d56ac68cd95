//! `2kc audit` — view the local audit trail.

use chrono::Utc;

use crate::audit::AuditTrail;
use crate::cli::{output, parse_since, Cli};
use crate::config::broker_home;
use crate::errors::Result;

pub fn execute(_cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    let since = match since {
        Some(s) => Some(Utc::now() - parse_since(s)?),
        None => None,
    };

    let Some(trail) = AuditTrail::open(&broker_home()?) else {
        output::warning("Audit trail is unavailable");
        return Ok(());
    };

    let entries = trail.query(last, since)?;
    output::print_audit_table(&entries);
    Ok(())
}
