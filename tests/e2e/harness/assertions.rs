use super::runner::Names;
use anyhow::Result;
use capmap_core::CapabilityMap;

/// Declarative assertions on map state
pub enum Assertion {
    // Locks
    LockState {
        observer: String,
        node: String,
        expected: LockStateMatch,
    },
    HeldBy {
        nick: String,
        nodes: Vec<String>,
    },

    // Tree shape
    ParentIs {
        node: String,
        parent: Option<String>,
    },
    ChildrenAre {
        parent: Option<String>,
        names: Vec<String>,
    },
    NodeMissing(String),
    CapabilityCount(usize),
    Consistent,

    // Presence
    ActiveSessions(usize),
    IdleSessions {
        minutes: u64,
        count: usize,
    },

    // Custom (sees the map and the scenario's names)
    Custom(Box<dyn Fn(&CapabilityMap, &Names) -> Result<()> + Send + Sync>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LockState {
                observer,
                node,
                expected,
            } => write!(
                f,
                "LockState {{ observer: {:?}, node: {:?}, expected: {:?} }}",
                observer, node, expected
            ),
            Self::HeldBy { nick, nodes } => {
                write!(f, "HeldBy {{ nick: {:?}, nodes: {:?} }}", nick, nodes)
            }
            Self::ParentIs { node, parent } => {
                write!(f, "ParentIs {{ node: {:?}, parent: {:?} }}", node, parent)
            }
            Self::ChildrenAre { parent, names } => {
                write!(f, "ChildrenAre {{ parent: {:?}, names: {:?} }}", parent, names)
            }
            Self::NodeMissing(node) => write!(f, "NodeMissing({:?})", node),
            Self::CapabilityCount(n) => write!(f, "CapabilityCount({})", n),
            Self::Consistent => write!(f, "Consistent"),
            Self::ActiveSessions(n) => write!(f, "ActiveSessions({})", n),
            Self::IdleSessions { minutes, count } => {
                write!(f, "IdleSessions {{ minutes: {}, count: {} }}", minutes, count)
            }
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

/// Match against effective lock states, naming sessions and nodes
#[derive(Clone, Debug)]
pub enum LockStateMatch {
    Free,
    LockedBySelf,
    LockedByOther(String),
    BlockedByAncestor { ancestor: String, holder: String },
}
