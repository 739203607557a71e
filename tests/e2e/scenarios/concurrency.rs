use crate::harness::{Assertion, Names, Scenario};
use capmap_core::{CapError, CapabilityMap, ErrorKind, MoveOutcome, MoveRequest, UnlockOutcome};
use std::sync::Barrier;
use std::thread;

#[test]
fn test_racing_lock_requests_grant_exactly_one() {
    Scenario::new("lock_race")
        .join("alice")
        .create_root("alice", "Sales")
        .assert(Assertion::Custom(Box::new(|map, names| {
            let sales = names.node("Sales")?;
            let barrier = Barrier::new(8);
            let results: Vec<Result<_, CapError>> = thread::scope(|s| {
                let handles: Vec<_> = (0..8)
                    .map(|i| {
                        let barrier = &barrier;
                        s.spawn(move || {
                            let me = map.join(&format!("racer-{}", i))?.session_id;
                            barrier.wait();
                            map.lock_node(&me, sales)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let granted = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(granted, 1);
            for err in results.iter().filter_map(|r| r.as_ref().err()) {
                assert_eq!(err.kind(), ErrorKind::AlreadyLocked);
            }
            map.check_consistency()?;
            Ok(())
        })))
        .run()
        .unwrap();
}

#[test]
fn test_competing_drags_never_tear_the_tree() {
    Scenario::new("drag_race")
        .join("alice")
        .join("bob")
        .create_root("alice", "Left")
        .create_root("alice", "Right")
        .create_under("alice", "Left", "Card")
        .assert(Assertion::Custom(Box::new(|map, names| {
            let card = names.node("Card")?;
            let targets = [names.node("Left")?, names.node("Right")?];
            let sessions = [names.session("alice")?, names.session("bob")?];

            thread::scope(|s| {
                for (session, target) in sessions.iter().zip(targets) {
                    s.spawn(move || {
                        for round in 0..50 {
                            // Claim, drag, release; losing the claim is fine.
                            match map.lock_node(session, card) {
                                Ok(_) => {
                                    map.move_node(
                                        session,
                                        MoveRequest::under(card, target, round % 2),
                                    )
                                    .unwrap();
                                    assert_eq!(
                                        map.unlock_node(session, card).unwrap(),
                                        UnlockOutcome::Released
                                    );
                                }
                                Err(e) => assert_eq!(e.kind(), ErrorKind::AlreadyLocked),
                            }
                        }
                    });
                }
            });

            map.check_consistency()?;
            let parent = map.get_node(card)?.parent_id;
            assert!(parent.is_some_and(|p| targets.contains(&p)));
            assert_eq!(map.capability_count()?, 3);
            Ok(())
        })))
        .assert_held("alice", &[])
        .assert_held("bob", &[])
        .run()
        .unwrap();
}

fn card_between_two_columns(name: &str) -> Scenario {
    Scenario::new(name)
        .join("alice")
        .join("bob")
        .create_root("alice", "Left")
        .create_root("alice", "Right")
        .create_root("alice", "Card")
}

/// Both sessions drag `Card` at the same instant, alice to `Left` and bob to
/// `Right`, and each gets its own outcome back.
fn race_moves(
    map: &CapabilityMap,
    names: &Names,
) -> anyhow::Result<(capmap_core::Result<MoveOutcome>, capmap_core::Result<MoveOutcome>)> {
    let card = names.node("Card")?;
    let alice = names.session("alice")?;
    let bob = names.session("bob")?;
    let left = names.node("Left")?;
    let right = names.node("Right")?;
    let barrier = Barrier::new(2);

    Ok(thread::scope(|s| {
        let first = s.spawn(|| {
            barrier.wait();
            map.move_node(&alice, MoveRequest::under(card, left, 0))
        });
        let second = s.spawn(|| {
            barrier.wait();
            map.move_node(&bob, MoveRequest::under(card, right, 0))
        });
        (first.join().unwrap(), second.join().unwrap())
    }))
}

#[test]
fn test_racing_move_against_held_source_is_rejected() {
    card_between_two_columns("held_source_race")
        .lock("alice", "Card")
        .assert(Assertion::Custom(Box::new(|map, names| {
            let before = map.capability_count()?;
            let (alice, bob) = race_moves(map, names)?;

            alice?;
            assert_eq!(bob.unwrap_err().kind(), ErrorKind::SourceLocked);

            let card = names.node("Card")?;
            let left = names.node("Left")?;
            assert_eq!(map.get_node(card)?.parent_id, Some(left));
            let holders: usize = [left, names.node("Right")?]
                .into_iter()
                .map(|p| map.children(Some(p)).map(|c| c.iter().filter(|c| c.id == card).count()))
                .sum::<capmap_core::Result<usize>>()?;
            assert_eq!(holders, 1);
            assert_eq!(map.capability_count()?, before);
            map.check_consistency()?;
            Ok(())
        })))
        .assert_children(Some("Left"), &["Card"])
        .assert_children(Some("Right"), &[])
        .assert_children(None, &["Left", "Right"])
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_unlocked_racing_moves_both_land_consistently() {
    card_between_two_columns("free_source_race")
        .assert(Assertion::Custom(Box::new(|map, names| {
            let before = map.capability_count()?;
            for _ in 0..25 {
                let (alice, bob) = race_moves(map, names)?;
                alice?;
                bob?;
                map.check_consistency()?;

                // The later of the two moves decides where the card ends up.
                let card = names.node("Card")?;
                let parent = map.get_node(card)?.parent_id;
                let placements: usize = [names.node("Left")?, names.node("Right")?]
                    .into_iter()
                    .map(|p| {
                        map.children(Some(p))
                            .map(|c| c.iter().filter(|c| c.id == card).count())
                    })
                    .sum::<capmap_core::Result<usize>>()?;
                assert_eq!(placements, 1);
                assert!(parent.is_some());
                assert_eq!(map.capability_count()?, before);
            }
            Ok(())
        })))
        .assert_consistent()
        .run()
        .unwrap();
}
