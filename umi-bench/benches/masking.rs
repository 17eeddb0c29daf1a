//! Criterion benchmarks for the per-turn hot path.
//!
//! Targets:
//! - `mask_full_fish`: < 10µs for a 15-token line at rate 0.9
//! - `mask_same_tier`: identity path, no RNG draws
//! - `tier_of`: branch-only lookup over the whole level range
//! - `parse_response`: < 20µs for a typical three-section reply

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use umi_core::{Masker, masking_rate, parse_response, tier_of};

const LINE: &str = "당신도 곧 알게 될 거예요. 바다는 우리 모두를 기억하고 있어요, 어부님. 내일 아침에 다시 오세요.";

const REPLY: &str = r#"THOUGHT: 이 사람은 아직 바다를 몰라. 조금 더 친해져야 해.
UPDATED_STATS: {"Friendly": 62, "Faith": 71, "Umi_Level": 15}
SAY: "오늘 밤에는 문을 꼭 잠그세요. 파도 소리가 평소보다 커요.""#;

fn bench_masking(c: &mut Criterion) {
    let masker = Masker::default();

    c.bench_function("mask_full_fish", |b| {
        let mut rng = StdRng::seed_from_u64(7);
        b.iter(|| masker.mask(black_box(LINE), 100, 0, &mut rng));
    });

    c.bench_function("mask_same_tier", |b| {
        let mut rng = StdRng::seed_from_u64(7);
        b.iter(|| masker.mask(black_box(LINE), 45, 55, &mut rng));
    });

    c.bench_function("masking_rate_grid", |b| {
        b.iter(|| {
            let mut total = 0.0;
            for speaker in 0..5u8 {
                for listener in 0..5u8 {
                    total += masking_rate(black_box(speaker), black_box(listener));
                }
            }
            total
        });
    });
}

fn bench_tiers(c: &mut Criterion) {
    c.bench_function("tier_of", |b| {
        b.iter(|| (-10..=110).map(|level| u32::from(tier_of(black_box(level)))).sum::<u32>());
    });
}

fn bench_parsing(c: &mut Criterion) {
    c.bench_function("parse_response", |b| {
        b.iter(|| parse_response(black_box(REPLY)));
    });

    c.bench_function("parse_response_no_stats", |b| {
        b.iter(|| parse_response(black_box("SAY: \"어서 오세요.\"")));
    });
}

criterion_group!(benches, bench_masking, bench_tiers, bench_parsing);
criterion_main!(benches);
