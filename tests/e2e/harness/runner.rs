use super::assertions::{Assertion, LockStateMatch};
use super::clock::MockClock;
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use anyhow::{anyhow, bail, Context, Result};
use capmap_core::{
    CapabilityId, CapabilityMap, CapabilityNode, CapabilityUpdate, LockState, MoveRequest,
    SessionId,
};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Scenario names for sessions and capabilities, resolved to real ids.
#[derive(Default)]
pub struct Names {
    sessions: HashMap<String, SessionId>,
    nodes: HashMap<String, CapabilityId>,
}

impl Names {
    /// Session id of a joined nickname
    pub fn session(&self, nick: &str) -> Result<SessionId> {
        self.sessions
            .get(nick)
            .cloned()
            .ok_or_else(|| anyhow!("No session named {:?}", nick))
    }

    /// Id of a capability by the name it was created with
    pub fn node(&self, name: &str) -> Result<CapabilityId> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("No capability named {:?}", name))
    }

    fn slot(&self, parent: Option<&String>) -> Result<Option<CapabilityId>> {
        parent.map(|name| self.node(name)).transpose()
    }

    fn nodes_named(&self, names: &[String]) -> Result<BTreeSet<CapabilityId>> {
        names.iter().map(|name| self.node(name)).collect()
    }

    fn register_forest(&mut self, forest: &[CapabilityNode]) {
        let mut stack: Vec<&CapabilityNode> = forest.iter().collect();
        while let Some(node) = stack.pop() {
            if let Some(id) = node.id {
                self.nodes.insert(node.name.clone(), id);
            }
            stack.extend(node.children.iter());
        }
    }
}

/// Executes scenarios against a real disk-backed map
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    map: Option<CapabilityMap>,
    clock: MockClock,
    names: Names,
    crashed: bool,
    current_step: usize,
}

impl ScenarioRunner {
    /// Create a runner over a freshly initialized map
    pub fn new() -> Result<Self> {
        let workspace = TestWorkspace::empty()?;
        let clock = MockClock::new();
        let map = workspace
            .init_map()?
            .with_time_provider(clock.as_provider());

        Ok(Self {
            workspace,
            map: Some(map),
            clock,
            names: Names::default(),
            crashed: false,
            current_step: 0,
        })
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Execute all steps in sequence
    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    fn map(&self) -> Result<&CapabilityMap> {
        self.map
            .as_ref()
            .ok_or_else(|| anyhow!("Map not available (crashed?)"))
    }

    /// Execute a single step
    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::Rejected { step, kind } => {
                let before = self.snapshot()?;
                match self.perform(step)? {
                    Ok(()) => bail!("Expected {:?}, but the command succeeded", kind),
                    Err(e) if e.kind() == *kind => {}
                    Err(e) => bail!("Expected {:?}, got {:?}: {}", kind, e.kind(), e),
                }
                if self.snapshot()? != before {
                    bail!("Rejected command changed the map");
                }
                Ok(())
            }
            ScenarioStep::Wait { duration } => self.handle_wait(*duration),
            ScenarioStep::Crash => self.handle_crash(),
            ScenarioStep::Restart => self.handle_restart(),
            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion),
            command => Ok(self.perform(command)??),
        }
    }

    /// Tree and lock state used to check that a rejected command left no trace
    fn snapshot(&self) -> Result<(Vec<CapabilityNode>, Vec<BTreeSet<CapabilityId>>)> {
        let map = self.map()?;
        let locks = map
            .list_active_sessions()?
            .into_iter()
            .map(|s| s.locked_capabilities)
            .collect();
        Ok((map.export()?, locks))
    }

    /// Runs one command step.
    ///
    /// The outer result reports harness problems (unknown names, no map); the
    /// inner one is the map's own verdict.
    fn perform(&mut self, step: &ScenarioStep) -> Result<capmap_core::Result<()>> {
        let map = self
            .map
            .as_ref()
            .ok_or_else(|| anyhow!("Map not available (crashed?)"))?;
        let names = &mut self.names;

        let outcome = match step {
            ScenarioStep::Join { nick } => map.join(nick).map(|session| {
                names.sessions.insert(nick.clone(), session.session_id);
            }),
            ScenarioStep::Leave { nick } => {
                let session = names.session(nick)?;
                map.leave(&session).map(|_| {
                    names.sessions.remove(nick);
                })
            }
            ScenarioStep::Create { nick, parent, name } => {
                let session = names.session(nick)?;
                let parent = names.slot(parent.as_ref())?;
                map.create_node(&session, parent, name, "", None)
                    .map(|created| {
                        names.nodes.insert(name.clone(), created.id);
                    })
            }
            ScenarioStep::Rename { nick, node, name } => {
                let update = CapabilityUpdate {
                    name: Some(name.clone()),
                    description: None,
                };
                map.update_node(&names.session(nick)?, names.node(node)?, &update)
                    .map(|_| ())
            }
            ScenarioStep::Delete { nick, node } => map
                .delete_node(&names.session(nick)?, names.node(node)?)
                .map(|_| ()),
            ScenarioStep::Move {
                nick,
                node,
                parent,
                index,
            } => {
                let request = MoveRequest {
                    capability: names.node(node)?,
                    target_parent: names.slot(parent.as_ref())?,
                    index: *index,
                };
                map.move_node(&names.session(nick)?, request).map(|_| ())
            }
            ScenarioStep::Import { nick, json } => {
                let session = names.session(nick)?;
                map.import_json(&session, json)
                    .and_then(|_| map.export())
                    .map(|forest| {
                        names.nodes.clear();
                        names.register_forest(&forest);
                    })
            }
            ScenarioStep::Lock { nick, node } => map
                .lock_node(&names.session(nick)?, names.node(node)?)
                .map(|_| ()),
            ScenarioStep::Unlock { nick, node } => map
                .unlock_node(&names.session(nick)?, names.node(node)?)
                .map(|_| ()),
            ScenarioStep::ClearMine { nick } => {
                map.clear_my_locks(&names.session(nick)?).map(|_| ())
            }
            ScenarioStep::ClearAll { nick } => {
                map.clear_all_locks(&names.session(nick)?).map(|_| ())
            }
            other => bail!("{:?} is not a command", other),
        };
        Ok(outcome)
    }

    // ===== Time control =====

    fn handle_wait(&mut self, duration: Duration) -> Result<()> {
        self.clock.advance(duration);
        Ok(())
    }

    // ===== Failure simulation =====

    fn handle_crash(&mut self) -> Result<()> {
        // Drop the map without leaving; sessions live only in memory
        self.map = None;
        self.names.sessions.clear();
        self.crashed = true;
        Ok(())
    }

    fn handle_restart(&mut self) -> Result<()> {
        if !self.crashed {
            return Err(anyhow!("Cannot restart - not crashed"));
        }
        let map = self
            .workspace
            .open_map()?
            .with_time_provider(self.clock.as_provider());
        self.map = Some(map);
        self.crashed = false;
        Ok(())
    }

    // ===== Assertions =====

    fn handle_assertion(&self, assertion: &Assertion) -> Result<()> {
        let map = self.map()?;
        let names = &self.names;
        match assertion {
            Assertion::LockState {
                observer,
                node,
                expected,
            } => {
                let actual =
                    map.effective_lock_state(&names.session(observer)?, names.node(node)?)?;
                if !self.state_matches(&actual, expected)? {
                    bail!("Expected {:?} to see {:?}, got {:?}", observer, expected, actual);
                }
            }
            Assertion::HeldBy { nick, nodes } => {
                let actual = map.session(&names.session(nick)?)?.locked_capabilities;
                let expected = names.nodes_named(nodes)?;
                if actual != expected {
                    bail!("Expected {:?} to hold {:?}, holds {:?}", nick, expected, actual);
                }
            }
            Assertion::ParentIs { node, parent } => {
                let actual = map.get_node(names.node(node)?)?.parent_id;
                let expected = names.slot(parent.as_ref())?;
                if actual != expected {
                    bail!("Expected parent {:?}, got {:?}", expected, actual);
                }
            }
            Assertion::ChildrenAre { parent, names: expected } => {
                let actual: Vec<String> = map
                    .children(names.slot(parent.as_ref())?)?
                    .into_iter()
                    .map(|c| c.name)
                    .collect();
                if &actual != expected {
                    bail!("Expected children {:?}, got {:?}", expected, actual);
                }
            }
            Assertion::NodeMissing(node) => {
                if map.get_node(names.node(node)?).is_ok() {
                    bail!("Expected {:?} to be gone", node);
                }
            }
            Assertion::CapabilityCount(n) => {
                let actual = map.capability_count()?;
                if actual != *n {
                    bail!("Expected {} capabilities, got {}", n, actual);
                }
            }
            Assertion::Consistent => map.check_consistency()?,
            Assertion::ActiveSessions(n) => {
                let actual = map.list_active_sessions()?.len();
                if actual != *n {
                    bail!("Expected {} sessions, got {}", n, actual);
                }
            }
            Assertion::IdleSessions { minutes, count } => {
                let idle = map.idle_sessions(Duration::from_secs(minutes * 60))?;
                if idle.len() != *count {
                    bail!("Expected {} idle sessions, got {}", count, idle.len());
                }
            }
            Assertion::Custom(f) => f(map, names)?,
        }
        Ok(())
    }

    fn state_matches(&self, actual: &LockState, expected: &LockStateMatch) -> Result<bool> {
        let names = &self.names;
        Ok(match (expected, actual) {
            (LockStateMatch::Free, LockState::Free) => true,
            (LockStateMatch::LockedBySelf, LockState::LockedBySelf) => true,
            (LockStateMatch::LockedByOther(nick), LockState::LockedByOther { holder }) => {
                *holder == names.session(nick)?
            }
            (
                LockStateMatch::BlockedByAncestor { ancestor, holder },
                LockState::BlockedByAncestor {
                    ancestor: actual_ancestor,
                    holder: actual_holder,
                },
            ) => {
                *actual_ancestor == names.node(ancestor)?
                    && *actual_holder == names.session(holder)?
            }
            _ => false,
        })
    }
}
