//! Non-interactive command line that reproduces a run

use crate::batch::ExecutionStrategy;
use crate::roles::RoleDefinition;
use crate::targets::TargetSelection;

const COMMAND: &str = "custom-roles create";

/// Characters that force quoting of an otherwise bare value
const SHELL_SPECIAL: &[char] = &[
    '\'', '"', '`', '$', '\\', '&', '|', ';', '<', '>', '(', ')', '*', '?', '[', ']', '{', '}',
    '~', '#', '!',
];

/// Wrap `value` in single quotes, escaping embedded single quotes
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn shell_word(value: &str) -> String {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || SHELL_SPECIAL.contains(&c)) {
        shell_quote(value)
    } else {
        value.to_string()
    }
}

/// Build the `custom-roles create ...` line for a finished run
pub fn build_replication_command(
    hostname: &str,
    selection: &TargetSelection,
    role: &RoleDefinition,
    strategy: ExecutionStrategy,
) -> String {
    let mut parts = vec![COMMAND.to_string(), format!("--hostname {}", shell_word(hostname))];

    match selection {
        TargetSelection::Org(org) => parts.push(format!("--org {}", shell_word(org))),
        TargetSelection::AllOrgs { enterprise } => {
            parts.push(format!("--enterprise {}", shell_word(enterprise)));
            parts.push("--all-orgs".to_string());
        }
        TargetSelection::Csv(path) => {
            parts.push(format!("--orgs-csv {}", shell_word(&path.to_string_lossy())));
        }
    }

    parts.push(format!("--role-name {}", shell_quote(&role.name)));
    if let Some(description) = role.description.as_deref() {
        parts.push(format!("--role-description {}", shell_quote(description)));
    }
    parts.push(format!("--base-role {}", role.base_role));
    parts.push(format!("--permissions {}", shell_word(&role.permissions.join(","))));

    let delay = strategy.delay_secs();
    if delay > 0 {
        parts.push(format!("--delay {delay}"));
    }
    let concurrency = strategy.concurrency();
    if concurrency > 1 {
        parts.push(format!("--concurrency {concurrency}"));
    }

    parts.join(" ")
}
