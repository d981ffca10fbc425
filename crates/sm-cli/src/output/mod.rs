//! Terminal output helpers

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use std::io::Write;
use tabled::{settings::Style, Table, Tabled};

use sm_core::config::AccountConfig;
use sm_orchestrator::{ConnectReport, StateOutcome};

/// Format an account's instances as a table
pub fn format_instances(account: &AccountConfig) -> String {
    if account.instances.is_empty() {
        return "No instances configured".to_string();
    }

    #[derive(Tabled)]
    struct InstanceRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "INSTANCE ID")]
        instance_id: String,
        #[tabled(rename = "REGION")]
        region: String,
        #[tabled(rename = "TYPE")]
        connection_type: String,
        #[tabled(rename = "USER")]
        user: String,
        #[tabled(rename = "LOCAL PORT")]
        local_port: String,
    }

    let rows: Vec<InstanceRow> = account
        .instances
        .iter()
        .map(|i| InstanceRow {
            name: i.name.clone(),
            instance_id: i.instance_id.clone(),
            region: i.region.clone().unwrap_or_else(|| account.region.clone()),
            connection_type: i.connection_type.clone(),
            user: match (&i.domain, &i.username) {
                (Some(domain), Some(user)) => format!("{}\\{}", domain, user),
                (None, Some(user)) => user.clone(),
                _ => "-".to_string(),
            },
            local_port: i
                .local_port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "random".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// One-line description of a state outcome
pub fn format_outcome(outcome: &StateOutcome) -> String {
    match outcome {
        StateOutcome::Ready { started: true } => "instance started".to_string(),
        StateOutcome::Ready { started: false } => "done".to_string(),
        StateOutcome::Aborted => "left unchanged".to_string(),
        StateOutcome::Failed(kind) => kind.describe().to_string(),
    }
}

/// Print the summary of a connection attempt
pub fn print_report(report: &ConnectReport) {
    if !report.state.is_ready() {
        print_error(&format!(
            "Instance not available: {}",
            format_outcome(&report.state)
        ));
        return;
    }

    match (&report.action_error, report.tunnel_ready) {
        (_, false) => print_error("Tunnel did not become ready"),
        (Some(err), true) => print_error(&format!("Connection failed: {:#}", err)),
        (None, true) => print_success("Connection closed"),
    }

    if let Some(StateOutcome::Failed(kind)) = &report.restored {
        print_warning(&format!("Could not restore instance state: {}", kind.describe()));
    }
}

fn print_prefixed(out: &mut impl Write, color: Color, prefix: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(prefix),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_prefixed(&mut std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message to stderr in red with an X prefix
pub fn print_error(msg: &str) {
    print_prefixed(&mut std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning message to stderr in yellow
pub fn print_warning(msg: &str) {
    print_prefixed(&mut std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_prefixed(&mut std::io::stdout(), Color::Cyan, "ℹ ", msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_core::config::InstanceProfile;
    use sm_core::ApiErrorKind;

    #[test]
    fn test_format_instances() {
        let account = AccountConfig {
            instances: vec![InstanceProfile {
                name: "desktop".into(),
                instance_id: "i-01234567890abcdef".into(),
                connection_type: "rdp".into(),
                domain: Some("corp".into()),
                username: Some("alice".into()),
                ..Default::default()
            }],
            ..Default::default()
        };

        let table = format_instances(&account);
        assert!(table.contains("desktop"));
        assert!(table.contains("i-01234567890abcdef"));
        assert!(table.contains("us-west-1"));
        assert!(table.contains("corp\\alice"));
        assert!(table.contains("random"));
    }

    #[test]
    fn test_format_instances_empty() {
        assert_eq!(
            format_instances(&AccountConfig::default()),
            "No instances configured"
        );
    }

    #[test]
    fn test_format_outcome() {
        assert_eq!(
            format_outcome(&StateOutcome::Failed(ApiErrorKind::NotFound)),
            "Instance could not be found"
        );
        assert_eq!(format_outcome(&StateOutcome::Aborted), "left unchanged");
    }
}
