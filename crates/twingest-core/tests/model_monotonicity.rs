//! Property tests for model evolution

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use twingest_core::{MemoryTwinStore, ModelCache, ModelTemplate};

const RAW: &str = "dtmi:com:example:prop";

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn versions_never_decrease_for_growing_property_sets(
        steps in prop::collection::vec(prop::collection::btree_set("[a-f]", 0..4), 1..8)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let cache = ModelCache::new(Arc::new(MemoryTwinStore::new()), Duration::from_secs(300));
            let template = ModelTemplate::auto("prop");
            let mut seen: BTreeSet<String> = BTreeSet::new();
            let mut last_version = 0;

            for step in steps {
                seen.extend(step);
                let names: Vec<String> = seen.iter().cloned().collect();

                let id = cache.ensure_model(RAW, &names, &template).await.unwrap();
                assert!(id.version() >= last_version);
                assert!(id.version() <= last_version + 1);
                last_version = id.version();

                let latest = cache.latest(RAW).await.unwrap().unwrap();
                assert_eq!(latest.id, id);
                assert!(names.iter().all(|n| latest.has_property(n)));
            }
        });
    }

    #[test]
    fn evolved_model_declares_exactly_the_union(
        base in prop::collection::btree_set("[a-f]", 1..4),
        extra in prop::collection::btree_set("[g-k]", 1..4)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let cache = ModelCache::new(Arc::new(MemoryTwinStore::new()), Duration::from_secs(300));
            let template = ModelTemplate::auto("prop");
            let base: Vec<String> = base.into_iter().collect();
            let all: Vec<String> = base.iter().cloned().chain(extra).collect();

            cache.ensure_model(RAW, &base, &template).await.unwrap();
            let id = cache.ensure_model(RAW, &all, &template).await.unwrap();
            assert_eq!(id.version(), 2);

            let latest = cache.latest(RAW).await.unwrap().unwrap();
            let declared: Vec<String> = latest.property_names().map(str::to_string).collect();
            assert_eq!(declared, all);
        });
    }
}
