use crate::harness::Scenario;
use capmap_core::ErrorKind;

fn branch(name: &str) -> Scenario {
    Scenario::new(name)
        .join("alice")
        .join("bob")
        .create_root("alice", "Sales")
        .create_under("alice", "Sales", "Leads")
        .create_under("alice", "Leads", "Hot Leads")
        .create_root("alice", "Support")
}

#[test]
fn test_foreign_descendant_lock_blocks_delete() {
    branch("descendant_lock")
        .lock("bob", "Hot Leads")
        .delete("alice", "Sales")
        .rejected(ErrorKind::Locked)
        .assert_count(4)
        .leave("bob")
        .delete("alice", "Sales")
        .assert_count(1)
        .assert_missing("Hot Leads")
        .assert_children(None, &["Support"])
        .assert_consistent()
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_ancestor_lock_blocks_delete_below() {
    branch("ancestor_lock")
        .lock("alice", "Sales")
        .delete("bob", "Leads")
        .rejected(ErrorKind::Locked)
        .delete("alice", "Leads")
        .assert_children(Some("Sales"), &[])
        .run()
        .unwrap();
}

#[test]
fn test_deleting_own_locked_branch_releases_its_locks() {
    branch("own_branch")
        .lock("alice", "Sales")
        .lock("alice", "Hot Leads")
        .lock("alice", "Support")
        .delete("alice", "Sales")
        .assert_held("alice", &["Support"])
        .assert_count(1)
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_delete_unknown_capability() {
    branch("unknown")
        .delete("alice", "Leads")
        .delete("alice", "Leads")
        .rejected(ErrorKind::NotFound)
        .run()
        .unwrap();
}
