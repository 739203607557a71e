//! Interactive multi-session shell.
//!
//! One process hosts many sessions, addressed by nickname, so lock contention
//! between users can be tried out from a single terminal.

use super::render;
use anyhow::{anyhow, Result};
use capmap_core::{
    CapabilityId, CapabilityMap, CapabilityUpdate, LockOutcome, MoveRequest, SessionId,
    UnlockOutcome,
};
use console::style;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::debug;

const HELP: &str = "\
Sessions:
  join <nick>                 start a session
  leave <nick>                end it and release its locks
  who                         list sessions and their locks
Views:
  tree [nick]                 print the tree as <nick> sees it
  changes [since]             change events since a version
Commands, run as a session:
  <nick> lock <id>            <nick> unlock <id>
  <nick> add <parent|-> <name...>
  <nick> mv <id> <parent|-> [index]
  <nick> rm <id>              <nick> state <id>
  <nick> edit <id> <name...>  <nick> describe <id> <text...>
  <nick> clear                release own locks
  <nick> clear-all            release every lock
help, quit";

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Join(String),
    Leave(String),
    Who,
    Tree(Option<String>),
    Changes(Option<u64>),
    Help,
    Quit,
    As { nick: String, action: Action },
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Lock(CapabilityId),
    Unlock(CapabilityId),
    Add {
        parent: Option<CapabilityId>,
        name: String,
    },
    Move {
        id: CapabilityId,
        parent: Option<CapabilityId>,
        index: usize,
    },
    Remove(CapabilityId),
    Rename {
        id: CapabilityId,
        name: String,
    },
    Describe {
        id: CapabilityId,
        text: String,
    },
    State(CapabilityId),
    Clear,
    ClearAll,
}

fn parse_id(word: Option<&str>) -> Result<CapabilityId, String> {
    let word = word.ok_or("missing capability id")?;
    word.parse()
        .map_err(|_| format!("'{}' is not a capability id", word))
}

fn parse_slot(word: Option<&str>) -> Result<Option<CapabilityId>, String> {
    match word {
        Some("-") => Ok(None),
        other => parse_id(other).map(Some),
    }
}

fn rest(words: &[&str]) -> Result<String, String> {
    if words.is_empty() {
        Err("missing text".to_string())
    } else {
        Ok(words.join(" "))
    }
}

/// Parses one input line. Blank lines yield `None`.
fn parse_line(line: &str) -> Result<Option<Line>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = words.split_first() else {
        return Ok(None);
    };

    let parsed = match (head, args) {
        ("join", [nick]) => Line::Join(nick.to_string()),
        ("leave", [nick]) => Line::Leave(nick.to_string()),
        ("who", []) => Line::Who,
        ("tree", []) => Line::Tree(None),
        ("tree", [nick]) => Line::Tree(Some(nick.to_string())),
        ("changes", []) => Line::Changes(None),
        ("changes", [since]) => Line::Changes(Some(
            since
                .parse()
                .map_err(|_| format!("'{}' is not a version", since))?,
        )),
        ("help", []) => Line::Help,
        ("quit", []) | ("exit", []) => Line::Quit,
        (nick, [command, params @ ..]) => Line::As {
            nick: nick.to_string(),
            action: parse_action(command, params)?,
        },
        _ => return Err(format!("unknown command '{}'; try 'help'", head)),
    };
    Ok(Some(parsed))
}

fn parse_action(command: &str, params: &[&str]) -> Result<Action, String> {
    let mut it = params.iter().copied();
    let action = match command {
        "lock" => Action::Lock(parse_id(it.next())?),
        "unlock" => Action::Unlock(parse_id(it.next())?),
        "rm" => Action::Remove(parse_id(it.next())?),
        "state" => Action::State(parse_id(it.next())?),
        "clear" => Action::Clear,
        "clear-all" => Action::ClearAll,
        "add" => {
            let parent = parse_slot(it.next())?;
            let name = rest(params.get(1..).unwrap_or_default())?;
            Action::Add { parent, name }
        }
        "mv" => {
            let id = parse_id(it.next())?;
            let parent = parse_slot(it.next())?;
            let index = match it.next() {
                Some(word) => word
                    .parse()
                    .map_err(|_| format!("'{}' is not an index", word))?,
                None => 0,
            };
            Action::Move { id, parent, index }
        }
        "edit" => {
            let id = parse_id(it.next())?;
            let name = rest(params.get(1..).unwrap_or_default())?;
            Action::Rename { id, name }
        }
        "describe" => {
            let id = parse_id(it.next())?;
            let text = rest(params.get(1..).unwrap_or_default())?;
            Action::Describe { id, text }
        }
        other => return Err(format!("unknown session command '{}'; try 'help'", other)),
    };
    Ok(action)
}

/// Sessions opened from this shell, keyed by nickname.
struct Shell<'a> {
    map: &'a CapabilityMap,
    sessions: HashMap<String, SessionId>,
    seen: u64,
}

impl<'a> Shell<'a> {
    fn new(map: &'a CapabilityMap) -> Result<Self> {
        Ok(Self {
            map,
            sessions: HashMap::new(),
            seen: map.current_version().map_err(super::describe)?,
        })
    }

    fn session(&self, nick: &str) -> Result<&SessionId> {
        self.sessions
            .get(nick)
            .ok_or_else(|| anyhow!("'{}' has not joined; use 'join {}'", nick, nick))
    }

    fn execute(&mut self, line: Line) -> Result<()> {
        let map = self.map;
        match line {
            Line::Join(nick) => {
                if self.sessions.contains_key(&nick) {
                    println!("{} is already here", nick);
                    return Ok(());
                }
                let session = map.join(&nick).map_err(super::describe)?;
                println!(
                    "{} joined as {}",
                    style(&session.nickname).bold(),
                    style(render::short(session.session_id.as_str())).dim()
                );
                self.sessions.insert(nick, session.session_id);
            }
            Line::Leave(nick) => {
                let session = self.session(&nick)?.clone();
                let released = map.leave(&session).map_err(super::describe)?;
                self.sessions.remove(&nick);
                println!("{} left, released {} lock(s)", nick, released.len());
            }
            Line::Who => {
                let sessions = map.list_active_sessions().map_err(super::describe)?;
                if sessions.is_empty() {
                    println!("{}", style("nobody is here").dim());
                }
                for session in &sessions {
                    render::print_session(session);
                }
            }
            Line::Tree(nick) => {
                // Without a nickname, view as an outsider holding nothing.
                let observer = match nick {
                    Some(nick) => self.session(&nick)?.clone(),
                    None => SessionId::from("-"),
                };
                let forest = map.get_tree(&observer, None).map_err(super::describe)?;
                render::print_tree(&forest);
            }
            Line::Changes(since) => {
                let changes = map
                    .changes_since(since.unwrap_or(self.seen))
                    .map_err(super::describe)?;
                if changes.truncated {
                    println!(
                        "{}",
                        style("older changes were dropped; re-read the tree").yellow()
                    );
                }
                for event in &changes.events {
                    render::print_event(event);
                }
                self.seen = changes.version;
            }
            Line::Help => println!("{}", HELP),
            Line::Quit => {}
            Line::As { nick, action } => {
                let session = self.session(&nick)?.clone();
                self.act(&session, action).map_err(super::describe)?;
            }
        }
        Ok(())
    }

    fn act(&self, session: &SessionId, action: Action) -> capmap_core::Result<()> {
        let map = self.map;
        match action {
            Action::Lock(id) => match map.lock_node(session, id)? {
                LockOutcome::Acquired => println!("locked #{}", id),
                LockOutcome::AlreadyHeld => println!("#{} was already yours", id),
            },
            Action::Unlock(id) => match map.unlock_node(session, id)? {
                UnlockOutcome::Released => println!("unlocked #{}", id),
                UnlockOutcome::NotLocked => println!("#{} was not locked", id),
            },
            Action::Add { parent, name } => {
                let created = map.create_node(session, parent, &name, "", None)?;
                println!("created #{} {}", created.id, created.name);
            }
            Action::Move { id, parent, index } => {
                let outcome = map.move_node(
                    session,
                    MoveRequest {
                        capability: id,
                        target_parent: parent,
                        index,
                    },
                )?;
                println!("moved #{} to position {}", outcome.capability, outcome.to_index);
            }
            Action::Remove(id) => {
                let removed = map.delete_node(session, id)?;
                println!("deleted {} capability(ies)", removed.len());
            }
            Action::Rename { id, name } => {
                let update = CapabilityUpdate {
                    name: Some(name),
                    description: None,
                };
                let updated = map.update_node(session, id, &update)?;
                println!("renamed #{} to {}", updated.id, updated.name);
            }
            Action::Describe { id, text } => {
                let update = CapabilityUpdate {
                    name: None,
                    description: Some(text),
                };
                map.update_node(session, id, &update)?;
                println!("described #{}", id);
            }
            Action::State(id) => {
                let state = map.effective_lock_state(session, id)?;
                match state.blocking_holder() {
                    Some(holder) => println!(
                        "#{}: {} ({})",
                        id,
                        state.label(),
                        render::short(holder.as_str())
                    ),
                    None => println!("#{}: {}", id, state.label()),
                }
            }
            Action::Clear => {
                let released = map.clear_my_locks(session)?;
                println!("released {} lock(s)", released.len());
            }
            Action::ClearAll => {
                let released = map.clear_all_locks(session)?;
                println!("released {} lock(s) of all sessions", released.len());
            }
        }
        Ok(())
    }

    /// Ends every session this shell opened.
    fn leave_all(&mut self) -> Result<()> {
        for (_, session) in self.sessions.drain() {
            self.map.leave(&session).map_err(super::describe)?;
        }
        Ok(())
    }
}

/// Run the interactive shell over the map in `dir`.
pub fn run(dir: &Path) -> Result<()> {
    let map = super::open(dir)?;
    let mut shell = Shell::new(&map)?;

    println!("capmap shell. Type 'help' for commands, 'quit' to leave.");
    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        print!("{} ", style("capmap>").cyan());
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(Line::Quit)) => break,
            Ok(Some(command)) => {
                debug!(?command, "shell command");
                if let Err(e) = shell.execute(command) {
                    println!("{} {:#}", style("error:").red(), e);
                }
            }
            Err(usage) => println!("{} {}", style("error:").red(), usage),
        }
    }

    shell.leave_all()?;
    map.flush_storage().map_err(super::describe)?;
    Ok(())
}
