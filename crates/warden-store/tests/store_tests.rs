#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;
    use warden_store::{
        ACTIVE_GOAL_POINTER, Collection, MemoryStateStore, SqliteStateStore, StateStore,
    };

    // Every behaviour is checked against both implementations.
    fn stores() -> Vec<(&'static str, Box<dyn StateStore>)> {
        vec![
            ("sqlite", Box::new(SqliteStateStore::open_in_memory().unwrap())),
            ("memory", Box::new(MemoryStateStore::new())),
        ]
    }

    // ── Records ────────────────────────────────────────────────

    mod records {
        use super::*;

        #[test]
        fn test_upsert_and_get() {
            for (name, store) in stores() {
                store
                    .upsert(Collection::QueueItems, "goal-1", &json!({"status": "queued"}))
                    .unwrap();
                store
                    .upsert(Collection::QueueItems, "goal-1", &json!({"status": "running"}))
                    .unwrap();
                let got = store.get(Collection::QueueItems, "goal-1").unwrap().unwrap();
                assert_eq!(got["status"], "running", "{name}");
                assert!(store.get(Collection::QueueItems, "goal-2").unwrap().is_none());
            }
        }

        #[test]
        fn test_collections_are_isolated() {
            for (name, store) in stores() {
                store.upsert(Collection::Candidates, "x", &json!(1)).unwrap();
                assert!(store.get(Collection::Suppressions, "x").unwrap().is_none(), "{name}");
            }
        }

        #[test]
        fn test_insert_if_absent_is_idempotent() {
            for (name, store) in stores() {
                assert!(store
                    .insert_if_absent(Collection::Suppressions, "sup-1", &json!({"n": 1}))
                    .unwrap());
                assert!(!store
                    .insert_if_absent(Collection::Suppressions, "sup-1", &json!({"n": 2}))
                    .unwrap());
                let all = store.list(Collection::Suppressions, None).unwrap();
                assert_eq!(all.len(), 1, "{name}");
                assert_eq!(all[0]["n"], 1, "{name}");
            }
        }

        #[test]
        fn test_list_keeps_insertion_order_across_updates() {
            for (name, store) in stores() {
                for id in ["a", "b", "c"] {
                    store.upsert(Collection::Candidates, id, &json!({"id": id})).unwrap();
                }
                store
                    .upsert(Collection::Candidates, "a", &json!({"id": "a", "v": 2}))
                    .unwrap();
                let ids: Vec<String> = store
                    .list(Collection::Candidates, None)
                    .unwrap()
                    .iter()
                    .map(|v| v["id"].as_str().unwrap().to_string())
                    .collect();
                assert_eq!(ids, vec!["a", "b", "c"], "{name}");
            }
        }

        #[test]
        fn test_list_limit_returns_newest() {
            for (name, store) in stores() {
                for i in 0..5 {
                    store
                        .upsert(Collection::Candidates, &format!("c{i}"), &json!({"i": i}))
                        .unwrap();
                }
                let recent = store.list(Collection::Candidates, Some(2)).unwrap();
                assert_eq!(recent.len(), 2, "{name}");
                assert_eq!(recent[0]["i"], 3, "{name}");
                assert_eq!(recent[1]["i"], 4, "{name}");
            }
        }

        #[test]
        fn test_list_by_status_filters_in_insertion_order() {
            for (name, store) in stores() {
                for (id, status) in [("g1", "queued"), ("g2", "completed"), ("g3", "running")] {
                    store
                        .upsert(Collection::QueueItems, id, &json!({ "goal_id": id, "status": status }))
                        .unwrap();
                }
                store
                    .upsert(Collection::QueueItems, "g1", &json!({ "goal_id": "g1", "status": "failed" }))
                    .unwrap();
                store
                    .upsert(Collection::QueueItems, "g4", &json!({ "goal_id": "g4" }))
                    .unwrap();

                let open = store
                    .list_by_status(Collection::QueueItems, &["queued", "scheduled", "running"])
                    .unwrap();
                let ids: Vec<_> = open.iter().map(|v| v["goal_id"].as_str().unwrap()).collect();
                assert_eq!(ids, vec!["g3"], "{name}");

                let done = store
                    .list_by_status(Collection::QueueItems, &["failed", "completed"])
                    .unwrap();
                let ids: Vec<_> = done.iter().map(|v| v["goal_id"].as_str().unwrap()).collect();
                assert_eq!(ids, vec!["g1", "g2"], "{name}");

                assert!(store.list_by_status(Collection::Candidates, &["queued"]).unwrap().is_empty());
            }
        }

        #[test]
        fn test_list_empty_collection() {
            for (name, store) in stores() {
                assert!(store.list(Collection::QueueItems, Some(10)).unwrap().is_empty(), "{name}");
            }
        }
    }

    // ── Pointer ────────────────────────────────────────────────

    mod pointer {
        use super::*;

        #[test]
        fn test_unset_pointer_is_clear() {
            for (name, store) in stores() {
                let p = store.get_pointer(ACTIVE_GOAL_POINTER).unwrap();
                assert!(p.value.is_none(), "{name}");
                assert!(p.updated_at.is_none(), "{name}");
            }
        }

        #[test]
        fn test_compare_and_set_acquire_and_release() {
            for (name, store) in stores() {
                let now = Utc::now();
                assert!(store
                    .compare_and_set_pointer(ACTIVE_GOAL_POINTER, None, Some("goal-1"), now)
                    .unwrap());
                // A second acquirer loses
                assert!(!store
                    .compare_and_set_pointer(ACTIVE_GOAL_POINTER, None, Some("goal-2"), now)
                    .unwrap(), "{name}");
                let p = store.get_pointer(ACTIVE_GOAL_POINTER).unwrap();
                assert_eq!(p.value.as_deref(), Some("goal-1"), "{name}");

                // Releasing with the wrong owner does nothing
                assert!(!store
                    .compare_and_set_pointer(ACTIVE_GOAL_POINTER, Some("goal-2"), None, now)
                    .unwrap());
                assert!(store
                    .compare_and_set_pointer(ACTIVE_GOAL_POINTER, Some("goal-1"), None, now)
                    .unwrap());
                assert!(store.get_pointer(ACTIVE_GOAL_POINTER).unwrap().value.is_none(), "{name}");
            }
        }

        #[test]
        fn test_pointer_records_update_time() {
            for (name, store) in stores() {
                let then = Utc::now() - Duration::seconds(1200);
                store
                    .compare_and_set_pointer(ACTIVE_GOAL_POINTER, None, Some("goal-9"), then)
                    .unwrap();
                let p = store.get_pointer(ACTIVE_GOAL_POINTER).unwrap();
                let at = p.updated_at.unwrap();
                assert!((at - then).num_seconds().abs() <= 1, "{name}");
            }
        }
    }

    // ── SQLite persistence ─────────────────────────────────────

    mod sqlite {
        use super::*;

        #[test]
        fn test_state_survives_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("warden.db");
            {
                let store = SqliteStateStore::open(&path).unwrap();
                store
                    .upsert(Collection::QueueItems, "goal-1", &json!({"status": "queued"}))
                    .unwrap();
                store
                    .compare_and_set_pointer(ACTIVE_GOAL_POINTER, None, Some("goal-1"), Utc::now())
                    .unwrap();
            }
            let store = SqliteStateStore::open(&path).unwrap();
            assert_eq!(store.list(Collection::QueueItems, None).unwrap().len(), 1);
            assert_eq!(
                store.get_pointer(ACTIVE_GOAL_POINTER).unwrap().value.as_deref(),
                Some("goal-1")
            );
        }

        #[test]
        fn test_two_handles_share_the_pointer() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("warden.db");
            let a = SqliteStateStore::open(&path).unwrap();
            let b = SqliteStateStore::open(&path).unwrap();
            let now = Utc::now();
            assert!(a
                .compare_and_set_pointer(ACTIVE_GOAL_POINTER, None, Some("goal-a"), now)
                .unwrap());
            assert!(!b
                .compare_and_set_pointer(ACTIVE_GOAL_POINTER, None, Some("goal-b"), now)
                .unwrap());
        }

        #[test]
        fn test_racing_handles_admit_one_holder() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("warden.db");
            SqliteStateStore::open(&path).unwrap();
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = SqliteStateStore::open(&path).unwrap();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        let goal = format!("goal-{i}");
                        store
                            .compare_and_set_pointer(ACTIVE_GOAL_POINTER, None, Some(&goal), Utc::now())
                            .unwrap()
                    })
                })
                .collect();
            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
        }
    }
}
