//! Warnings for statements that change the session security state.
//!
//! The session variable is an unauthenticated channel: any statement sent on
//! the connection can overwrite it or switch roles until the next bind. These
//! checks only log; the statement is forwarded regardless.

use crate::binder::SESSION_TOKEN_VARIABLE;

/// Kind of session change a statement attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// Sets or resets the security token variable.
    TokenVariable,
    /// Switches role or session authorization.
    RoleSwitch,
}

/// Classify the first session-changing command in `sql`, if any.
///
/// Heuristic: commands are split on `;` without regard to quoting.
#[must_use]
pub fn classify(sql: &str) -> Option<SessionChange> {
    let lowered = sql.to_ascii_lowercase();
    if lowered.contains("set_config") && lowered.contains(SESSION_TOKEN_VARIABLE) {
        return Some(SessionChange::TokenVariable);
    }
    lowered.split(';').find_map(classify_command)
}

fn classify_command(command: &str) -> Option<SessionChange> {
    let mut words = command.split_whitespace();
    let verb = words.next()?;
    if verb != "set" && verb != "reset" {
        return None;
    }

    let mut target = words.next()?;
    if verb == "set" && (target == "session" || target == "local") {
        let next = words.next()?;
        if target == "session" && next == "authorization" {
            return Some(SessionChange::RoleSwitch);
        }
        target = next;
    }

    if target.starts_with(SESSION_TOKEN_VARIABLE) || (verb == "reset" && target == "all") {
        return Some(SessionChange::TokenVariable);
    }
    if target == "role" || (target == "session" && words.next() == Some("authorization")) {
        return Some(SessionChange::RoleSwitch);
    }
    None
}

/// Log a warning if `sql` changes the session security state.
pub(crate) fn warn_on_session_change(sql: &str) {
    match classify(sql) {
        Some(SessionChange::TokenVariable) => tracing::warn!(
            variable = SESSION_TOKEN_VARIABLE,
            "statement overrides the session security token"
        ),
        Some(SessionChange::RoleSwitch) => {
            tracing::warn!("statement switches the session role");
        }
        None => {}
    }
}
