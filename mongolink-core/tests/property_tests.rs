//! Property-based tests for database handles
//!
//! Random catalogs, settings sequences and move sequences against the
//! in-memory server.

use mongolink_core::{
    doc, Client, ClientOptions, CreateCollectionOptions, Database, MemoryDriver, WriteConcern,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn client_with_batch(batch_size: u32) -> (Arc<MemoryDriver>, Client) {
    let driver = Arc::new(MemoryDriver::new());
    let options = ClientOptions::new().with_list_collections_batch_size(batch_size);
    let client = Client::with_options(driver.clone(), options).unwrap();
    (driver, client)
}

fn write_concern_strategy() -> impl Strategy<Value = WriteConcern> {
    prop_oneof![
        Just(WriteConcern::default()),
        Just(WriteConcern::majority()),
        (1u32..5).prop_map(WriteConcern::nodes),
        "[a-z]{1,6}".prop_map(WriteConcern::tag),
        (1u64..10_000).prop_map(|ms| WriteConcern::majority().with_timeout_ms(ms)),
    ]
}

proptest! {
    /// name() never changes, whatever settings are mutated
    #[test]
    fn prop_name_stable_across_settings(
        name in "[a-z][a-z0-9_]{0,15}",
        concerns in prop::collection::vec(write_concern_strategy(), 0..8)
    ) {
        let (_driver, client) = client_with_batch(101);
        let mut db = client.database(&name);
        for wc in concerns {
            db.set_write_concern(wc);
            prop_assert_eq!(db.name(), name.as_str());
        }
    }

    /// has_collection agrees with list_collections for present and absent names
    #[test]
    fn prop_has_collection_matches_listing(
        created in prop::collection::btree_set("[a-z]{1,8}", 0..12),
        lookups in prop::collection::vec("[a-z]{1,8}", 1..8),
        batch_size in 1u32..5
    ) {
        let (_driver, client) = client_with_batch(batch_size);
        let db = client.database("app");
        for name in &created {
            db.create_collection(name, &CreateCollectionOptions::new()).unwrap();
        }

        let listed: BTreeSet<String> = db
            .list_collections(None)
            .unwrap()
            .map(|d| d.unwrap()["name"].as_str().unwrap().to_string())
            .collect();
        prop_assert_eq!(&listed, &created);

        for lookup in lookups.iter().chain(created.iter()) {
            prop_assert_eq!(db.has_collection(lookup).unwrap(), listed.contains(lookup));
        }
    }

    /// An empty filter never yields fewer descriptors than any other filter,
    /// and a cursor is single-pass
    #[test]
    fn prop_empty_filter_is_superset(
        created in prop::collection::btree_set("[a-z]{1,6}", 0..10),
        prefix in "[a-z]",
        batch_size in 1u32..4
    ) {
        let (driver, client) = client_with_batch(batch_size);
        let db = client.database("app");
        for name in &created {
            db.create_collection(name, &CreateCollectionOptions::new()).unwrap();
        }

        let all = db.list_collections(None).unwrap().count();
        let filter = doc! { "name": { "$regex": format!("^{}", prefix) } };
        let mut filtered = db.list_collections(Some(filter)).unwrap();
        let some = filtered.by_ref().count();

        prop_assert!(all >= some);
        prop_assert_eq!(all, created.len());
        prop_assert!(filtered.next().is_none());
        drop(filtered);
        prop_assert_eq!(driver.open_cursors(), 0);
    }

    /// Collections keep the settings they were created with
    #[test]
    fn prop_settings_copied_on_derive(
        concerns in prop::collection::vec(write_concern_strategy(), 1..8)
    ) {
        let (_driver, client) = client_with_batch(101);
        let mut db = client.database("app");

        let mut derived = Vec::new();
        for wc in &concerns {
            db.set_write_concern(wc.clone());
            derived.push(db.collection("c"));
        }
        db.set_write_concern(WriteConcern::tag("late"));

        for (collection, wc) in derived.iter().zip(&concerns) {
            prop_assert_eq!(collection.write_concern(), wc);
        }
    }

    /// Random take/drop sequences release every resource exactly once
    #[test]
    fn prop_moves_release_each_resource_once(
        ops in prop::collection::vec((0usize..4, 0usize..4, any::<bool>()), 0..20)
    ) {
        let (driver, client) = client_with_batch(101);
        let mut slots: Vec<Database> = (0..4).map(|i| client.database(&format!("db{}", i))).collect();

        for (from, to, reset) in ops {
            if reset {
                slots[to] = Database::default();
            } else {
                let moved = slots[from].take();
                slots[to] = moved;
            }
            let valid = slots.iter().filter(|db| db.is_valid()).count();
            prop_assert_eq!(driver.live_resources(), valid);
        }

        slots.clear();
        prop_assert_eq!(driver.live_resources(), 0);
    }
}
