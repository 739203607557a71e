use crate::harness::{Assertion, Scenario};
use capmap_core::{ErrorKind, MoveRequest};

#[test]
fn test_locked_target_rejects_foreign_moves() {
    // R has child A locked by alice; B is an unrelated root.
    Scenario::new("locked_target")
        .join("alice")
        .join("bob")
        .create_root("alice", "R")
        .create_under("alice", "R", "A")
        .create_root("alice", "B")
        .lock("alice", "A")
        .move_under("bob", "B", "A", 0)
        .rejected(ErrorKind::TargetLocked)
        .assert_parent("B", None)
        .move_under("alice", "B", "A", 0)
        .assert_parent("B", Some("A"))
        .assert_children(None, &["R"])
        .assert_consistent()
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_locked_source_cannot_be_dragged_away() {
    Scenario::new("locked_source")
        .join("alice")
        .join("bob")
        .create_root("alice", "Sales")
        .create_under("alice", "Sales", "Leads")
        .create_root("alice", "Support")
        .lock("alice", "Leads")
        .move_under("bob", "Leads", "Support", 0)
        .rejected(ErrorKind::SourceLocked)
        .move_to_root("bob", "Leads", 0)
        .rejected(ErrorKind::SourceLocked)
        .unlock("alice", "Leads")
        .lock("alice", "Sales")
        // A branch lock covers the descendants as sources too.
        .move_under("bob", "Leads", "Support", 0)
        .rejected(ErrorKind::SourceLocked)
        .move_under("alice", "Leads", "Support", 0)
        .assert_parent("Leads", Some("Support"))
        .run()
        .unwrap();
}

#[test]
fn test_cycles_and_self_moves_are_rejected() {
    Scenario::new("cycles")
        .join("alice")
        .create_root("alice", "Sales")
        .create_under("alice", "Sales", "Leads")
        .create_under("alice", "Leads", "Hot Leads")
        .move_under("alice", "Sales", "Sales", 0)
        .rejected(ErrorKind::SelfMove)
        .move_under("alice", "Sales", "Hot Leads", 0)
        .rejected(ErrorKind::CycleViolation)
        .move_under("alice", "Leads", "Hot Leads", 0)
        .rejected(ErrorKind::CycleViolation)
        .assert_parent("Hot Leads", Some("Leads"))
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_missing_parent_is_invalid() {
    Scenario::new("missing_parent")
        .join("alice")
        .create_root("alice", "Sales")
        .create_root("alice", "Gone")
        .delete("alice", "Gone")
        .move_under("alice", "Sales", "Gone", 0)
        .rejected(ErrorKind::InvalidParent)
        .run()
        .unwrap();
}

#[test]
fn test_reorder_among_siblings() {
    Scenario::new("reorder")
        .join("alice")
        .create_root("alice", "Sales")
        .create_under("alice", "Sales", "X")
        .create_under("alice", "Sales", "Y")
        .create_under("alice", "Sales", "Z")
        .move_under("alice", "Z", "Sales", 0)
        .assert_children(Some("Sales"), &["Z", "X", "Y"])
        // Out-of-range positions append.
        .move_under("alice", "Z", "Sales", 99)
        .assert_children(Some("Sales"), &["X", "Y", "Z"])
        .run()
        .unwrap();
}

#[test]
fn test_move_to_root_and_back() {
    Scenario::new("root_round_trip")
        .join("alice")
        .create_root("alice", "Sales")
        .create_under("alice", "Sales", "Leads")
        .create_under("alice", "Sales", "Deals")
        .create_root("alice", "Support")
        .move_to_root("alice", "Leads", 1)
        .assert_children(None, &["Sales", "Leads", "Support"])
        .assert_children(Some("Sales"), &["Deals"])
        .move_under("alice", "Leads", "Sales", 0)
        .assert_children(None, &["Sales", "Support"])
        .assert_children(Some("Sales"), &["Leads", "Deals"])
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_subtree_travels_with_its_root() {
    Scenario::new("subtree_moves")
        .join("alice")
        .create_root("alice", "Sales")
        .create_under("alice", "Sales", "Leads")
        .create_under("alice", "Leads", "Hot Leads")
        .create_root("alice", "Marketing")
        .move_under("alice", "Leads", "Marketing", 0)
        .assert_parent("Hot Leads", Some("Leads"))
        .assert(Assertion::Custom(Box::new(|map, names| {
            let alice = names.session("alice")?;
            let tree = map.get_tree(&alice, Some(names.node("Marketing")?))?;
            assert_eq!(tree[0].children[0].name, "Leads");
            assert_eq!(tree[0].children[0].children[0].name, "Hot Leads");
            // Moving the branch back under its descendant stays impossible.
            let err = map
                .move_node(
                    &alice,
                    MoveRequest::under(names.node("Marketing")?, names.node("Hot Leads")?, 0),
                )
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CycleViolation);
            Ok(())
        })))
        .run()
        .unwrap();
}
