//! Match engine benchmarks for clash_core.
//!
//! Run with: `cargo bench -p clash_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use clash_core::ability::AbilityBook;
use clash_core::cpu::CpuPolicy;
use clash_core::state::{GameState, Side};
use clash_core::turn::EngineConfig;
use clash_test_utils::fixtures;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Six full turns of CPU against CPU, abilities included.
pub fn full_match_benchmark(c: &mut Criterion) {
    let book = AbilityBook::builtin().expect("builtin catalog");
    let policy = CpuPolicy::default();

    c.bench_function("cpu_vs_cpu_full_match", |b| {
        let mut seed = 0u64;
        b.iter(|| {
            seed += 1;
            let mut state = GameState::new(
                seed,
                [fixtures::ability_deck("a"), fixtures::ability_deck("b")],
                &book,
                EngineConfig::default(),
            );
            while !state.is_finished() {
                for side in Side::BOTH {
                    let actions = policy.choose(&state, side);
                    let _ = state.submit(side, actions);
                }
            }
            black_box(state.state_hash())
        });
    });

    c.bench_function("state_hash", |b| {
        let state = GameState::new(
            1,
            [fixtures::plain_deck("a", 10), fixtures::plain_deck("b", 10)],
            &book,
            EngineConfig::default(),
        );
        b.iter(|| black_box(state.state_hash()));
    });
}

criterion_group!(benches, full_match_benchmark);
criterion_main!(benches);
