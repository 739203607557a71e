use capmap_core::ErrorKind;
use std::time::Duration;

use super::assertions::Assertion;

/// All possible actions in a test scenario.
///
/// Sessions are named by nickname and capabilities by the name they were
/// created with; the runner maps both to real ids.
#[derive(Debug)]
pub enum ScenarioStep {
    // Presence
    Join {
        nick: String,
    },
    Leave {
        nick: String,
    },

    // Tree commands
    Create {
        nick: String,
        parent: Option<String>,
        name: String,
    },
    Rename {
        nick: String,
        node: String,
        name: String,
    },
    Delete {
        nick: String,
        node: String,
    },
    Move {
        nick: String,
        node: String,
        parent: Option<String>,
        index: usize,
    },
    Import {
        nick: String,
        json: String,
    },

    // Locks
    Lock {
        nick: String,
        node: String,
    },
    Unlock {
        nick: String,
        node: String,
    },
    ClearMine {
        nick: String,
    },
    ClearAll {
        nick: String,
    },

    /// The wrapped command must fail with this kind and change nothing
    Rejected {
        step: Box<ScenarioStep>,
        kind: ErrorKind,
    },

    // Time control
    Wait {
        duration: Duration,
    },

    // Failure simulation
    Crash,
    Restart,

    // Assertions (can be interspersed)
    Assert {
        assertion: Assertion,
    },
}
