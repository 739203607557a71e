use crate::harness::{Assertion, LockStateMatch, Scenario};

#[test]
fn test_tree_survives_restart_but_locks_do_not() {
    Scenario::new("restart")
        .join("alice")
        .create_root("alice", "Sales")
        .create_under("alice", "Sales", "Leads")
        .create_under("alice", "Sales", "Deals")
        .create_root("alice", "Support")
        .move_under("alice", "Deals", "Sales", 0)
        .rename("alice", "Support", "Customer Care")
        .lock("alice", "Sales")
        .crash()
        .restart()
        .assert_sessions(0)
        .assert_count(4)
        .assert_children(Some("Sales"), &["Deals", "Leads"])
        .assert_children(None, &["Sales", "Customer Care"])
        .assert_consistent()
        .join("bob")
        .assert_state("bob", "Leads", LockStateMatch::Free)
        .lock("bob", "Sales")
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_deletes_and_imports_are_durable() {
    Scenario::new("durable_replace")
        .join("alice")
        .create_root("alice", "Old")
        .create_under("alice", "Old", "Older")
        .delete("alice", "Older")
        .crash()
        .restart()
        .assert_count(1)
        .join("alice")
        .import_json(
            "alice",
            r#"[{"name":"Sales","children":[{"name":"Leads"},{"name":"Deals"}]},{"name":"Support"}]"#,
        )
        .crash()
        .restart()
        .assert_count(4)
        .assert_children(Some("Sales"), &["Leads", "Deals"])
        .assert(Assertion::Custom(Box::new(|map, names| {
            // Fresh ids keep growing after a reload.
            let bob = map.join("bob")?.session_id;
            let created = map.create_node(&bob, None, "Billing", "", None)?;
            assert!(created.id > names.node("Support")?);
            assert_eq!(map.pending_writes()?, 0);
            Ok(())
        })))
        .run()
        .unwrap();
}
