//! Performance benchmarks for matching and expiration sweeps

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lfg_registry::bot::{LfgBot, Notifier, Outbox};
use lfg_registry::registry::{LifecycleSweeper, MatchingEngine};
use lfg_registry::storage::{InMemoryRegistryStore, RegistryStore};
use lfg_registry::types::{Player, Role, Search};
use std::sync::Arc;

// Notifier that drops everything
struct BenchNotifier;

#[async_trait]
impl Notifier for BenchNotifier {
    async fn send_direct_message(
        &self,
        _recipient_id: &str,
        _content: &str,
    ) -> lfg_registry::error::Result<()> {
        Ok(())
    }
}

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

/// Store with `players` profiles and `searches` saved searches spread over
/// every role and the whole SR scale
fn seeded_store(players: usize, searches: usize) -> Arc<dyn RegistryStore> {
    let store = Arc::new(InMemoryRegistryStore::new());
    let today = start_date();

    for i in 0..players {
        let mut player = Player::new(format!("player{}", i), today);
        player.role = Role::SELECTABLE[i % Role::SELECTABLE.len()];
        player.sr = ((i * 37) % 4999) as i32 + 1;
        store.upsert_player(&player).unwrap();
    }

    for i in 0..searches {
        let mut search = Search::new(format!("searcher{}", i % 200), today);
        search.role = if i % 5 == 0 {
            Role::Any
        } else {
            Role::SELECTABLE[i % Role::SELECTABLE.len()]
        };
        if i % 3 != 0 {
            search.target_sr = Some(((i * 53) % 5000) as i32);
            search.range = 100 + (i % 4) as i32 * 100;
        }
        search.normalize();
        store.create_search(&search).unwrap();
    }

    store
}

fn bench_find_players(c: &mut Criterion) {
    let engine = MatchingEngine::new(seeded_store(5_000, 0));

    let mut search = Search::new("bench", start_date());
    search.role = Role::Tank;
    search.target_sr = Some(2500);

    c.bench_function("find_players_tank_2500_in_5000", |b| {
        b.iter(|| black_box(engine.find_players(black_box(&search))))
    });

    let wildcard = Search::new("bench", start_date());
    c.bench_function("find_players_wildcard_in_5000", |b| {
        b.iter(|| black_box(engine.find_players(black_box(&wildcard))))
    });
}

fn bench_find_searches(c: &mut Criterion) {
    let engine = MatchingEngine::new(seeded_store(0, 2_000));

    let mut player = Player::new("bench", start_date());
    player.role = Role::Support;
    player.sr = 3100;

    c.bench_function("find_searches_in_2000", |b| {
        b.iter(|| black_box(engine.find_searches(black_box(&player))))
    });
}

fn bench_player_update_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bot = LfgBot::new(
        seeded_store(1_000, 2_000),
        Outbox::new(Arc::new(BenchNotifier)),
    );

    let mut player = Player::new("bench", start_date());
    player.role = Role::Dps;
    player.sr = 2000;

    c.bench_function("player_update_fan_out", |b| {
        b.iter(|| rt.block_on(async { black_box(bot.on_player_update(&player).await) }))
    });
}

fn bench_sweep(c: &mut Criterion) {
    // Nothing is purgeable at day 8, so every iteration sees the same data
    let sweeper = LifecycleSweeper::new(seeded_store(2_000, 2_000));
    let now = start_date().checked_add_days(Days::new(8)).unwrap();

    c.bench_function("sweep_stale_4000_records", |b| {
        b.iter(|| black_box(sweeper.sweep(black_box(now))))
    });
}

criterion_group!(
    benches,
    bench_find_players,
    bench_find_searches,
    bench_player_update_fan_out,
    bench_sweep
);
criterion_main!(benches);
