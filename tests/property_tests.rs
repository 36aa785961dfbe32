//! Property-based coverage for the two invariants spec.md §8 states as
//! properties rather than fixed examples: termination under cyclic group
//! graphs, and idempotent writes under the tuple 5-key.

use authz_core::schema::reference_schema;
use authz_core::{AuthzEngine, Object, Subject, TupleFilter};
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("building a current-thread runtime")
        .block_on(future)
}

proptest! {
    /// `check` always terminates (and in particular never panics or hangs)
    /// regardless of how many groups loop back on each other — cycle safety
    /// and the shared depth budget (spec.md §4.3, §9) must hold for any
    /// membership graph, not just the two-cycle example in check.rs's tests.
    #[test]
    fn test_check_terminates_on_arbitrary_group_cycles(group_count in 2usize..8, edge_seed in any::<u64>()) {
        block_on(async move {
            let engine = AuthzEngine::in_memory(reference_schema().expect("valid schema"));
            let groups: Vec<Object> = (0..group_count)
                .map(|i| Object::new("team", format!("team-{i}")))
                .collect();

            // Every group is a member of the next, wrapping around — a cycle
            // of arbitrary length, keyed off `edge_seed` only to vary which
            // group the probing subject starts from.
            for i in 0..group_count {
                let member = Subject::from_object(&groups[i]);
                let next = groups[(i + 1) % group_count].clone();
                engine.add_member(member, next).await.expect("add_member");
            }

            let start = &groups[(edge_seed as usize) % group_count];
            let probe = Subject::from_object(start);
            let result = engine
                .check(&probe, "view", &Object::new("document", "doc1"))
                .await;

            prop_assert!(result.is_ok());
            prop_assert_eq!(result.expect("checked above"), false);
            Ok(())
        })?;
    }

    /// Writing the same `(subject, relation, object)` key any number of
    /// times never produces more than one stored tuple (spec.md §3, §8
    /// property 10).
    #[test]
    fn test_repeated_allow_never_duplicates_a_tuple(repeat_count in 1usize..20) {
        block_on(async move {
            let engine = AuthzEngine::in_memory(reference_schema().expect("valid schema"));
            let alice = Subject::new("user", "alice");
            let doc1 = Object::new("document", "doc1");

            for _ in 0..repeat_count {
                engine
                    .allow(alice.clone(), "owner", doc1.clone(), None)
                    .await
                    .expect("allow");
            }

            let tuples = engine
                .list_tuples(TupleFilter {
                    subject: Some(alice),
                    object: Some(doc1),
                    ..Default::default()
                })
                .await
                .expect("list_tuples");

            prop_assert_eq!(tuples.len(), 1);
            Ok(())
        })?;
    }
}
