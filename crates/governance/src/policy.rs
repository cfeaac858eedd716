//! RBAC policy decision point.
//!
//! Roles form a total order `reader < operator < maintainer < admin`; a
//! command is allowed when the actor's highest role meets the command's
//! minimum. Unknown commands are denied for every role. Every decision is
//! appended to the audit ledger with the (already redacted) argument map.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::audit::{AuditError, AuditEventKind, AuditLedger};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unknown role: {0:?}")]
    UnknownRole(String),
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
}

/// Actor roles, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Reader,
    Operator,
    Maintainer,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reader" => Ok(Role::Reader),
            "operator" => Ok(Role::Operator),
            "maintainer" => Ok(Role::Maintainer),
            "admin" => Ok(Role::Admin),
            other => Err(PolicyError::UnknownRole(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Operator => "operator",
            Role::Maintainer => "maintainer",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

// Minimum role per command. Read paths sit at reader, artifact-producing
// commands at operator, and anything that destroys or re-anchors state at
// maintainer. Commands absent from the table are denied outright.
static COMMAND_FLOOR: Lazy<HashMap<&'static str, Role>> = Lazy::new(|| {
    HashMap::from([
        ("policy whoami", Role::Reader),
        ("policy test", Role::Reader),
        ("audit verify", Role::Reader),
        ("integrity check", Role::Reader),
        ("corpus validate", Role::Reader),
        ("kg query", Role::Reader),
        ("snapshot-validate", Role::Reader),
        ("corpus build", Role::Operator),
        ("corpus snapshot", Role::Operator),
        ("kg emit", Role::Operator),
        ("kg load", Role::Operator),
        ("kg serve", Role::Operator),
        ("bundle export-profiles", Role::Operator),
        ("eval fr-coverage", Role::Operator),
        ("eval run-rag", Role::Operator),
        ("eval check-grounding", Role::Operator),
        ("index rebuild", Role::Operator),
        ("run", Role::Operator),
        ("gc plan", Role::Operator),
        ("gc apply", Role::Maintainer),
        ("audit rotate", Role::Maintainer),
    ])
});

/// The policy decision point. Stateless apart from the static floor table;
/// the ledger handle is threaded in per call so decisions and their audit
/// trail cannot diverge.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        PolicyEngine
    }

    /// Decide and audit in one step.
    pub fn decide(
        &self,
        ledger: &mut AuditLedger,
        actor: &str,
        roles: &[Role],
        command: &str,
        args: Value,
    ) -> Result<Decision, PolicyError> {
        let decision = self.evaluate(roles, command);
        let role_names: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
        ledger.append(
            actor,
            &role_names,
            AuditEventKind::PolicyDecision,
            serde_json::json!({
                "command": command,
                "args": args,
                "decision": decision,
                "floor": COMMAND_FLOOR.get(command).map(Role::as_str),
            }),
        )?;
        Ok(decision)
    }

    /// Pure evaluation without the audit side effect, for `policy test`.
    pub fn evaluate(&self, roles: &[Role], command: &str) -> Decision {
        let Some(floor) = COMMAND_FLOOR.get(command) else {
            return Decision::Deny;
        };
        match roles.iter().max() {
            Some(best) if best >= floor => Decision::Allow,
            _ => Decision::Deny,
        }
    }
}
