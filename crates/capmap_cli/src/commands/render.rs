//! Terminal rendering shared by the commands and the shell.

use capmap_core::{ChangeEvent, ChangeKind, LockState, SessionView, TreeAction, TreeView};
use chrono::DateTime;
use console::style;

/// Prints an annotated forest with two-space indentation per level.
pub fn print_tree(forest: &[TreeView]) {
    if forest.is_empty() {
        println!("{}", style("(empty)").dim());
        return;
    }
    let mut stack: Vec<(usize, &TreeView)> = forest.iter().rev().map(|v| (0, v)).collect();
    while let Some((depth, view)) = stack.pop() {
        println!(
            "{}{} {}{}",
            "  ".repeat(depth),
            style(format!("#{}", view.id)).dim(),
            view.name,
            lock_marker(&view.lock)
        );
        stack.extend(view.children.iter().rev().map(|c| (depth + 1, c)));
    }
}

fn lock_marker(lock: &LockState) -> String {
    match lock {
        LockState::Free => String::new(),
        LockState::LockedBySelf => format!("  {}", style("[locked by you]").green()),
        LockState::LockedByOther { holder } => {
            format!("  {}", style(format!("[locked by {}]", short(holder.as_str()))).red())
        }
        LockState::BlockedByAncestor { ancestor, holder } => format!(
            "  {}",
            style(format!("[blocked: #{} held by {}]", ancestor, short(holder.as_str()))).yellow()
        ),
    }
}

/// Prints one session line with its locks.
pub fn print_session(session: &SessionView) {
    let locks = if session.locked_capabilities.is_empty() {
        style("no locks".to_string()).dim()
    } else {
        let ids: Vec<String> = session
            .locked_capabilities
            .iter()
            .map(|id| format!("#{}", id))
            .collect();
        style(format!("locks {}", ids.join(", "))).cyan()
    };
    println!(
        "  {} {} joined {}  {}",
        style(&session.nickname).bold(),
        style(short(session.session_id.as_str())).dim(),
        format_time(session.joined_at),
        locks
    );
}

/// Prints one change event.
pub fn print_event(event: &ChangeEvent) {
    let what = match &event.kind {
        ChangeKind::TreeChanged { action, capability } => {
            let target = capability.map(|id| format!(" #{}", id)).unwrap_or_default();
            format!("tree {}{}", action_label(*action), target)
        }
        ChangeKind::LockChanged {
            capability,
            holder: Some(holder),
        } => format!("lock #{} by {}", capability, short(holder.as_str())),
        ChangeKind::LockChanged {
            capability,
            holder: None,
        } => format!("unlock #{}", capability),
        ChangeKind::LocksCleared { session, released } => match session {
            Some(session) => format!(
                "cleared {} lock(s) of {}",
                released.len(),
                short(session.as_str())
            ),
            None => format!("cleared all {} lock(s)", released.len()),
        },
        ChangeKind::PresenceChanged {
            nickname, joined, ..
        } => {
            if *joined {
                format!("{} joined", nickname)
            } else {
                format!("{} left", nickname)
            }
        }
    };
    println!(
        "  {} {}  {}",
        style(format!("v{}", event.version)).cyan(),
        style(format_time(event.at)).dim(),
        what
    );
}

fn action_label(action: TreeAction) -> &'static str {
    match action {
        TreeAction::Created => "created",
        TreeAction::Updated => "updated",
        TreeAction::Deleted => "deleted",
        TreeAction::Moved => "moved",
        TreeAction::Imported => "imported",
        TreeAction::Reset => "reset",
    }
}

/// Formats a Unix timestamp for display.
pub fn format_time(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

/// First eight characters of a session id.
pub fn short(id: &str) -> &str {
    id.char_indices().nth(8).map(|(i, _)| &id[..i]).unwrap_or(id)
}
