//! Golden tests for the piece kernel.
//!
//! These tests verify determinism and correctness of addressing, traversal
//! and persistence end to end.

mod common;

use std::ops::ControlFlow;
use std::sync::Arc;

use piece_kernel::timewalk::{traverse, TraversalOptions};
use piece_kernel::tree::{self, build, Kind, Node};
use piece_kernel::types::{ItemTag, Path, Position, Step};
use piece_kernel::{canonical_hash_hex, codec, KernelConfig, RetryPolicy};

use common::{h, init_tracing, long_voice, q, two_voice_piece};

fn voice_path(v: usize) -> Path {
    Path::parse(&format!("[:musicians 0 :instruments 0 :staves 0 :voices {}]", v)).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// PATH DESCRIPTOR TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_path_text_and_compact_forms_resolve_identically() {
    let tree = two_voice_piece();
    let full = voice_path(1).field("measures").index(0).field("items").index(1);
    let compact = Path::parse("[@u 0 @n 0 @s 0 @v 1 @m 0 @i 1]").unwrap();

    assert_eq!(compact.expand(), full);
    assert_eq!(full.compact(), compact);
    assert_eq!(Path::parse(&full.to_string()).unwrap(), full);

    let a = tree::resolve(&tree, &full).unwrap();
    let b = tree::resolve(&tree, &compact).unwrap();
    assert!(Arc::ptr_eq(a, b));
}

#[test]
fn test_stale_path_fails_explicitly() {
    let tree = two_voice_piece();
    let third = voice_path(0).field("measures").index(0).field("items").index(2);
    let items = third.parent().unwrap();
    assert!(tree::resolve(&tree, &third).is_ok());

    let shorter = tree::remove(&tree, &items, 0).unwrap();
    let shorter = tree::remove(&shorter, &items, 0).unwrap();
    let err = tree::resolve(&shorter, &third).unwrap_err();
    assert_eq!(err.depth, third.len() - 1);
    assert_eq!(err.path, third);
}

// ─────────────────────────────────────────────────────────────────────────────
// TREE TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_edit_shares_siblings_and_preserves_old_version() {
    // Record with field `a` holding three items; edit [:a 1].
    let items = Node::list(vec![
        build::pitch("C4", q()),
        build::pitch("D4", q()),
        build::pitch("E4", q()),
    ]);
    let old = Arc::new(Node::record(Kind::Group).with_field("a", items).unwrap());
    let before = (*old).clone();
    let path = Path::parse("[:a 1]").unwrap();

    let new = tree::edit(&old, &path, |n| {
        Node::Item(n.as_item().unwrap().with_duration(h()).unwrap())
    })
    .unwrap();

    let (o, n) = (old.field("a").unwrap(), new.field("a").unwrap());
    assert!(Arc::ptr_eq(o.child(0).unwrap(), n.child(0).unwrap()));
    assert!(Arc::ptr_eq(o.child(2).unwrap(), n.child(2).unwrap()));
    assert!(!Arc::ptr_eq(o.child(1).unwrap(), n.child(1).unwrap()));
    assert_eq!(*old, before);
    assert_eq!(n.child(1).unwrap().as_item().unwrap().duration(), h());
}

#[test]
fn test_edit_in_one_voice_shares_the_other() {
    let tree = two_voice_piece();
    let items = voice_path(0).field("measures").index(0).field("items");
    let next = tree::append(&tree, &items, build::rest(q())).unwrap();

    let v1_old = tree::resolve(&tree, &voice_path(1)).unwrap();
    let v1_new = tree::resolve(&next, &voice_path(1)).unwrap();
    assert!(Arc::ptr_eq(v1_old, v1_new));
    assert!(Arc::ptr_eq(
        tree.field("tempos").unwrap(),
        next.field("tempos").unwrap()
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// TRAVERSAL TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_two_voice_positions() {
    init_tracing();
    let tree = two_voice_piece();
    let visits = traverse(&tree, TraversalOptions::new()).collect();

    let positions: Vec<(usize, Position)> = visits
        .iter()
        .map(|v| (v.path.steps()[7].as_index().unwrap(), v.position))
        .collect();
    assert_eq!(
        positions,
        vec![
            (0, Position::ZERO),
            (0, q()),
            (0, h()),
            (1, Position::ZERO),
            (1, h()),
        ]
    );
    assert_eq!(visits[0].path.steps()[6], Step::field("voices"));
}

#[test]
fn test_same_tree_same_tuples_100_runs() {
    let tree = two_voice_piece();
    let first = traverse(&tree, TraversalOptions::new()).collect();
    for _ in 0..100 {
        assert_eq!(traverse(&tree, TraversalOptions::new()).collect(), first);
    }
}

#[test]
fn test_streaming_matches_materialized() {
    let tree = two_voice_piece();
    let options = || TraversalOptions::new().kinds([ItemTag::Pitch]).skip(1);

    let materialized = traverse(&tree, options()).collect();
    let mut streamed = Vec::new();
    traverse(&tree, options()).for_each(|t| streamed.push((t.path(), t.position)));

    assert_eq!(
        materialized
            .iter()
            .map(|v| (v.path.clone(), v.position))
            .collect::<Vec<_>>(),
        streamed
    );
    assert_eq!(traverse(&tree, options()).count(), materialized.len());
}

#[test]
fn test_early_termination_stops_at_first_item() {
    let tree = build::solo_piece(vec![long_voice(50, 4), long_voice(50, 4)]);

    let (all, full) = traverse(&tree, TraversalOptions::new()).count_with_stats();
    let (one, early) = traverse(&tree, TraversalOptions::new().take(1)).count_with_stats();

    assert_eq!(all, 400);
    assert_eq!(one, 1);
    assert!(early.terminated_early);
    assert!(!full.terminated_early);
    // Piece, key changes, musicians, musician, instruments, instrument, name,
    // staves, then staff, voices, voice, measures, measure, items, item.
    assert_eq!(early.nodes_entered, 15);
    // Ten nodes above the voices, two voices of 2 + 50 * 6, then the
    // musician name, tempos and time changes.
    assert_eq!(full.nodes_entered, 617);
}

#[test]
fn test_positions_monotonic_across_measures() {
    let voice = long_voice(8, 4);
    let mut last = None;
    let flow = traverse(&voice, TraversalOptions::new()).try_for_each(|t| {
        if let Some(prev) = last {
            assert!(t.position > prev);
        }
        last = Some(t.position);
        ControlFlow::Continue(())
    });
    assert_eq!(flow, ControlFlow::Continue(()));
    assert_eq!(last, Some(Position::new(31, 4)));
}

#[test]
fn test_bounded_window() {
    let voice = long_voice(4, 4);
    let options = TraversalOptions::new().range(Position::ONE, Position::new(7, 4));
    let visits = traverse(&voice, options).collect();
    assert_eq!(visits.len(), 4);
    assert_eq!(visits[0].position, Position::ONE);
    assert_eq!(visits[0].path, Path::parse("[:measures 1 :items 0]").unwrap());
}

// ─────────────────────────────────────────────────────────────────────────────
// CANONICAL SERIALIZATION TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_options_fingerprint_determinism() {
    let options = TraversalOptions::new()
        .scope(voice_path(0))
        .range(Position::ZERO, Position::ONE)
        .kinds([ItemTag::Pitch, ItemTag::Chord])
        .take(8);

    let first = options.fingerprint();
    for _ in 0..100 {
        assert_eq!(options.fingerprint(), first, "Options fingerprint must be deterministic");
    }
    assert_eq!(first.len(), 16);
}

#[test]
fn test_config_params_hash_stability() {
    let a = KernelConfig::default();
    let b = KernelConfig::default();
    assert_eq!(a.params_hash(), b.params_hash());
    assert_eq!(canonical_hash_hex(&a), canonical_hash_hex(&b));

    let tuned = KernelConfig {
        retry: RetryPolicy {
            max_attempts: 7,
            ..RetryPolicy::default()
        },
        ..KernelConfig::default()
    };
    assert_ne!(tuned.params_hash(), a.params_hash());
}

#[test]
fn test_codec_byte_level_determinism() {
    let bytes = codec::serialize(&two_voice_piece());
    for _ in 0..10 {
        assert_eq!(codec::serialize(&two_voice_piece()), bytes);
    }
    let back = codec::deserialize(&bytes).unwrap();
    assert_eq!(back, two_voice_piece());
    assert_eq!(back.digest(), two_voice_piece().digest());
}
