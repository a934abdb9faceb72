//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use piece_kernel::tree::{build, Node};
use piece_kernel::types::Position;

static TRACING: Once = Once::new();

/// Install a test subscriber once. Honours `RUST_LOG`, quiet by default.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Quarter note.
pub fn q() -> Position {
    Position::new(1, 4)
}

/// Half note.
pub fn h() -> Position {
    Position::new(1, 2)
}

/// Solo piece with two voices: three quarters, and two halves.
pub fn two_voice_piece() -> Arc<Node> {
    build::solo_piece(vec![
        build::voice(vec![build::measure(vec![
            build::pitch("C4", q()),
            build::pitch("D4", q()),
            build::pitch("E4", q()),
        ])]),
        build::voice(vec![build::measure(vec![
            build::pitch("G3", h()),
            build::pitch("A3", h()),
        ])]),
    ])
}

/// Voice of `measures` measures, each holding `per_measure` quarter notes.
pub fn long_voice(measures: usize, per_measure: usize) -> Arc<Node> {
    build::voice(
        (0..measures)
            .map(|_| build::measure((0..per_measure).map(|_| build::pitch("C4", q())).collect()))
            .collect(),
    )
}
