//! Performance benchmarks for traversal and transactions.
//!
//! Run with: `cargo bench --bench timewalk`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Full walk | Linear in items | No per-item allocation |
//! | First match | Independent of piece size | Early termination |
//! | Autocommit edit | Linear in depth | Path copy only |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

use piece_kernel::coordinator::{Coordinator, EditContext};
use piece_kernel::policy::KernelConfig;
use piece_kernel::timewalk::{traverse, TraversalOptions};
use piece_kernel::tree::{build, Node};
use piece_kernel::types::{ItemTag, Path, Position};

/// Piece with `voices` voices of `measures` measures of four quarters.
fn make_piece(voices: usize, measures: usize) -> Arc<Node> {
    let q = Position::new(1, 4);
    build::solo_piece(
        (0..voices)
            .map(|_| {
                build::voice(
                    (0..measures)
                        .map(|_| {
                            build::measure(vec![
                                build::pitch("C4", q),
                                build::rest(q),
                                build::chord(&["E4", "G4"], q),
                                build::pitch("D4", q),
                            ])
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}

/// Benchmark a full streaming walk.
fn bench_full_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_walk");

    for measures in [10, 100, 1000] {
        let piece = make_piece(4, measures);

        group.throughput(Throughput::Elements((4 * measures * 4) as u64));
        group.bench_with_input(BenchmarkId::new("measures", measures), &piece, |b, piece| {
            b.iter(|| traverse(black_box(piece), TraversalOptions::new()).count())
        });
    }

    group.finish();
}

/// Benchmark early termination on a growing piece.
fn bench_first_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_match");

    for measures in [10, 100, 1000] {
        let piece = make_piece(4, measures);

        group.bench_with_input(BenchmarkId::new("measures", measures), &piece, |b, piece| {
            b.iter(|| {
                let found = traverse(black_box(piece), TraversalOptions::new())
                    .find_first(|t| t.tag() == ItemTag::Chord);
                assert!(found.is_some());
                found
            })
        });
    }

    group.finish();
}

/// Benchmark merged multi-voice walks, which buffer.
fn bench_merge_by_position(c: &mut Criterion) {
    let piece = make_piece(4, 100);

    c.bench_function("merge_by_position", |b| {
        b.iter(|| {
            traverse(
                black_box(&piece),
                TraversalOptions::new().kinds([ItemTag::Pitch]).merge_by_position(),
            )
            .count()
        })
    });
}

/// Benchmark autocommit edits under thread contention.
fn bench_contended_commits(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_commits");
    let items = Path::parse("[:musicians 0 :instruments 0 :staves 0 :voices 0 :measures 0 :items]").unwrap();

    for num_threads in [1, 2, 4] {
        let coordinator = Arc::new(Coordinator::in_memory(KernelConfig::default()));
        let doc = coordinator.registry().register(make_piece(2, 10));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let coordinator = Arc::clone(&coordinator);
                            let doc = doc.clone();
                            let items = items.clone();
                            thread::spawn(move || {
                                let mut ctx = coordinator.autocommit();
                                for _ in 0..10 {
                                    ctx.move_down(&doc, items.clone(), 0).unwrap();
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_full_walk,
    bench_first_match,
    bench_merge_by_position,
    bench_contended_commits,
);
criterion_main!(benches);
