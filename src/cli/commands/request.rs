//! `2kc request` — the end-to-end access attempt.
//!
//! Build request → approval → grant → inject → forward the child's
//! output and exit code. Four audit events are emitted in program
//! order: `Request created`, `Approval <verdict>`, `Secret injected`
//! (metadata only, before the spawn), `Grant used` (after it, whatever
//! the child did).

use std::sync::Arc;

use crate::approval::{ApprovalChannel, DiscordChannel};
use crate::audit::AuditEmitter;
use crate::cli::{output, Cli, RequestArgs};
use crate::config::{broker_home, Config};
use crate::errors::{BrokerError, Result};
use crate::service::{broker_from_config, BrokerService};

pub fn execute(cli: &Cli, args: &RequestArgs) -> Result<i32> {
    let config = Config::load(cli.config_path())?;
    let broker = broker_from_config(&config)?;

    if args.duration == Some(0) {
        return Err(BrokerError::InvalidInput {
            field: "duration",
            message: "must be a positive number of seconds".into(),
        });
    }

    // The agent names secrets by uuid or slug; everything downstream
    // works on uuids.
    let uuids = args
        .secrets
        .iter()
        .map(|s| broker.resolve(s).map(|listing| listing.uuid))
        .collect::<Result<Vec<_>>>()
        .map_err(user_facing)?;

    let emitter = audit_emitter(&config);

    // 1. Create the request.
    let request = broker
        .create_request(&uuids, &args.reason, &args.task, args.duration)
        .map_err(user_facing)?;
    emitter.emit(
        &request.id,
        "Request created",
        &format!(
            "secrets=[{}] duration={}s task={}",
            uuids.join(", "),
            request.duration_seconds,
            request.task_ref
        ),
    );

    // 2. Drive approval and grant creation.
    let approved = match broker.validate_grant(&request.id) {
        Ok(valid) => valid,
        Err(e) => {
            emitter.emit(&request.id, "Approval denied", &e.to_string());
            return Err(user_facing(e));
        }
    };
    emitter.emit(
        &request.id,
        &format!("Approval {}", if approved { "approved" } else { "denied" }),
        &format!("task={}", request.task_ref),
    );

    if !approved {
        output::error("Access request was not approved");
        return Ok(1);
    }

    // 3. Inject — metadata only in the audit line, never the value.
    emitter.emit(
        &request.id,
        "Secret injected",
        &format!(
            "env={} command={}",
            args.env.as_deref().unwrap_or("-"),
            args.cmd.join(" ")
        ),
    );
    let outcome = broker.inject(&request.id, args.env.as_deref(), &args.cmd);

    // 4. The grant is consumed on every inject path.
    let details = match &outcome {
        Ok(result) => format!(
            "exit={}",
            result.exit_code.map_or("signal".into(), |c| c.to_string())
        ),
        Err(e) => format!("error={e}"),
    };
    emitter.emit(&request.id, "Grant used", &details);

    let result = outcome.map_err(user_facing)?;

    // Forward the child's streams verbatim; a signaled child maps to 1.
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    Ok(result.exit_code.unwrap_or(1))
}

/// The audit fan-out: Discord channel when configured, plus the local
/// trail under `~/.2kc`.
fn audit_emitter(config: &Config) -> AuditEmitter {
    let channel: Option<Arc<dyn ApprovalChannel>> = config.discord.as_ref().map(|d| {
        Arc::new(DiscordChannel::new(&d.webhook_url, &d.bot_token, &d.channel_id))
            as Arc<dyn ApprovalChannel>
    });
    AuditEmitter::new(channel, broker_home().ok().as_deref())
}

/// Rewrite common failures into the messages users act on.
fn user_facing(err: BrokerError) -> BrokerError {
    match err {
        BrokerError::NotFound(inner) => {
            BrokerError::CommandFailed(format!("Secret UUID not found: {inner}"))
        }
        BrokerError::GrantNotValid(id) => {
            BrokerError::CommandFailed(format!("Grant expired: {id}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_rewritten() {
        let err = user_facing(BrokerError::NotFound("uuid abc".into()));
        assert_eq!(err.to_string(), "Command failed: Secret UUID not found: uuid abc");
    }

    #[test]
    fn invalid_grant_reads_as_expired() {
        let err = user_facing(BrokerError::GrantNotValid("g-1".into()));
        assert_eq!(err.to_string(), "Command failed: Grant expired: g-1");
    }

    #[test]
    fn other_errors_pass_through() {
        let err = user_facing(BrokerError::EmptyCommand);
        assert!(matches!(err, BrokerError::EmptyCommand));
    }
}
