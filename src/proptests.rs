//! Property tests driving the tree against a `BTreeMap` model.
//!
//! The model always tells the truth: every mutation runs on both sides
//! and every observable (return values, length, iteration order, seek
//! targets) has to agree, with the structural checker run at the end of
//! each case.

use std::collections::BTreeMap;
use std::ops::Bound;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::{RadixTree, SeekOp};

/// Reference implementation.
#[derive(Default)]
struct Model {
    map: BTreeMap<Vec<u8>, u64>,
}

/// Operations to replay on both implementations.
#[derive(Arbitrary, Debug, Clone)]
enum Action {
    Insert(KeyValue),
    Get(Key),
    Remove(Key),
}

#[derive(Debug, Clone)]
struct Key(Vec<u8>);

#[derive(Debug, Clone)]
struct KeyValue {
    key: Key,
    value: u64,
}

impl Arbitrary for Key {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            // Empty key
            Just(Key(vec![])),
            // Short keys over a tiny alphabet, to force dense sharing
            prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'c']), 1..5)
                .prop_map(Key),
            // Arbitrary binary keys
            prop::collection::vec(any::<u8>(), 1..32).prop_map(Key),
            // Word-shaped keys with long common prefixes
            "[a-c]{3,6}(ane|anus|ulus|ens|er|icon|icundus)?"
                .prop_map(|s| Key(s.into_bytes())),
            // Keys sharing a fixed prefix of differing depth
            "[a-z]{0,6}".prop_map(|s| {
                let mut key = b"prefix/".to_vec();
                key.extend_from_slice(s.as_bytes());
                Key(key)
            }),
        ]
        .boxed()
    }
}

impl Arbitrary for KeyValue {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<Key>(), any::<u64>())
            .prop_map(|(key, value)| KeyValue { key, value })
            .boxed()
    }
}

/// Harness executing actions on both the tree and the model.
#[derive(Default)]
struct Test {
    tree: RadixTree<u64>,
    model: Model,
}

impl Test {
    fn execute(&mut self, action: Action) {
        match action {
            Action::Insert(kv) => {
                let key = kv.key.0;
                let tree_result = self.tree.insert(&key, kv.value).unwrap();
                let model_result = self.model.map.insert(key.clone(), kv.value);
                assert_eq!(
                    tree_result, model_result,
                    "insert mismatch for key {:?}",
                    key
                );
            }
            Action::Get(key) => {
                assert_eq!(
                    self.tree.get(&key.0),
                    self.model.map.get(&key.0),
                    "get mismatch for key {:?}",
                    key.0
                );
            }
            Action::Remove(key) => {
                assert_eq!(
                    self.tree.remove(&key.0),
                    self.model.map.remove(&key.0),
                    "remove mismatch for key {:?}",
                    key.0
                );
            }
        }
        assert_eq!(self.tree.len(), self.model.map.len());
        assert_eq!(self.tree.is_empty(), self.model.map.is_empty());
    }

    fn check_order(&self) {
        let forward: Vec<Vec<u8>> = self.tree.iter().map(|(k, _)| k).collect();
        let expected: Vec<Vec<u8>> = self.model.map.keys().cloned().collect();
        assert_eq!(forward, expected, "forward iteration order diverged");

        let mut backward = Vec::new();
        let mut cursor = self.tree.cursor();
        if cursor.seek(SeekOp::Last, b"") {
            while cursor.prev_key() {
                backward.push(cursor.key().to_vec());
            }
        }
        backward.reverse();
        assert_eq!(backward, expected, "backward iteration order diverged");
    }

    fn check_structure(&self) {
        let issues = self.tree.check_invariants();
        assert!(issues.is_empty(), "structural issues: {issues:?}");
    }
}

/// The model's answer for one seek: the key the cursor must land on.
fn model_seek(map: &BTreeMap<Vec<u8>, u64>, op: SeekOp, pivot: &[u8]) -> Option<Vec<u8>> {
    match op {
        SeekOp::First => map.keys().next().cloned(),
        SeekOp::Last => map.keys().next_back().cloned(),
        SeekOp::Eq => map.get_key_value(pivot).map(|(k, _)| k.clone()),
        SeekOp::Ge => map
            .range::<[u8], _>((Bound::Included(pivot), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone()),
        SeekOp::Gt => map
            .range::<[u8], _>((Bound::Excluded(pivot), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone()),
        SeekOp::Le => map
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(pivot)))
            .next_back()
            .map(|(k, _)| k.clone()),
        SeekOp::Lt => map
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(pivot)))
            .next_back()
            .map(|(k, _)| k.clone()),
    }
}

fn any_seek_op() -> impl Strategy<Value = SeekOp> {
    prop::sample::select(vec![
        SeekOp::First,
        SeekOp::Last,
        SeekOp::Eq,
        SeekOp::Ge,
        SeekOp::Gt,
        SeekOp::Le,
        SeekOp::Lt,
    ])
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn proptest_vs_btreemap(actions in prop::collection::vec(any::<Action>(), 1..64)) {
        let mut test = Test::default();
        for action in actions {
            test.execute(action);
        }
        test.check_order();
        test.check_structure();
    }

    #[test]
    fn proptest_seek_matches_model(
        entries in prop::collection::vec(any::<KeyValue>(), 0..40),
        pivot in any::<Key>(),
        op in any_seek_op(),
    ) {
        let mut test = Test::default();
        for kv in entries {
            test.execute(Action::Insert(kv));
        }

        let expected = model_seek(&test.model.map, op, &pivot.0);
        let mut cursor = test.tree.cursor();
        let positioned = cursor.seek(op, &pivot.0);
        prop_assert_eq!(positioned, expected.is_some(), "seek {:?} {:?}", op, pivot.0);

        if let Some(start) = expected {
            // Forward from the landing point covers exactly the model's
            // tail range, in order.
            let mut forward = Vec::new();
            while cursor.next_key() {
                forward.push(cursor.key().to_vec());
            }
            let tail: Vec<Vec<u8>> = test
                .model
                .map
                .range::<[u8], _>((Bound::Included(&start[..]), Bound::Unbounded))
                .map(|(k, _)| k.clone())
                .collect();
            prop_assert_eq!(&forward, &tail, "forward walk after seek {:?} {:?}", op, pivot.0);

            // Re-seek and go the other way: together the two traversals
            // cover every key exactly once, overlapping at the pivot.
            prop_assert!(cursor.seek(op, &pivot.0));
            let mut backward = Vec::new();
            while cursor.prev_key() {
                backward.push(cursor.key().to_vec());
            }
            let head: Vec<Vec<u8>> = test
                .model
                .map
                .range::<[u8], _>((Bound::Unbounded, Bound::Included(&start[..])))
                .rev()
                .map(|(k, _)| k.clone())
                .collect();
            prop_assert_eq!(&backward, &head, "backward walk after seek {:?} {:?}", op, pivot.0);
        } else {
            prop_assert!(!cursor.next_key());
            prop_assert!(!cursor.prev_key());
        }
    }

    #[test]
    fn proptest_range_and_prefix_match_model(
        entries in prop::collection::vec(any::<KeyValue>(), 0..40),
        low in any::<Key>(),
        high in any::<Key>(),
    ) {
        let mut test = Test::default();
        for kv in entries {
            test.execute(Action::Insert(kv));
        }
        let (start, end) = if low.0 <= high.0 { (low.0, high.0) } else { (high.0, low.0) };

        let got: Vec<Vec<u8>> = test.tree.range(&start, &end).map(|(k, _)| k).collect();
        let want: Vec<Vec<u8>> = if start == end {
            Vec::new()
        } else {
            test.model
                .map
                .range::<[u8], _>((Bound::Included(&start[..]), Bound::Excluded(&end[..])))
                .map(|(k, _)| k.clone())
                .collect()
        };
        prop_assert_eq!(got, want, "range {:?}..{:?}", start, end);

        let got: Vec<Vec<u8>> = test.tree.scan_prefix(&start).map(|(k, _)| k).collect();
        let want: Vec<Vec<u8>> = test
            .model
            .map
            .keys()
            .filter(|k| k.starts_with(&start))
            .cloned()
            .collect();
        prop_assert_eq!(got, want, "prefix scan {:?}", start);
    }

    #[test]
    fn proptest_random_walk_lands_on_keys(
        entries in prop::collection::vec(any::<KeyValue>(), 1..30),
        seed in any::<u64>(),
    ) {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut test = Test::default();
        for kv in entries {
            test.execute(Action::Insert(kv));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cursor = test.tree.cursor();
        for _ in 0..20 {
            prop_assert!(cursor.random_walk(&mut rng, 0));
            prop_assert!(test.model.map.contains_key(cursor.key()));
        }
    }
}
