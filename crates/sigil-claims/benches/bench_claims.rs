//! Benchmarks for the sign and verify hot paths

use chrono::Duration as ChronoDuration;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sigil_claims::{
    b64url, Claim, ClaimManager, ClaimRepositoryData, ClaimsConfig, IdentityClaim,
    SigningAlgorithm,
};

const SECRET: &str = "benchmark-secret-0123456789abcdef0123";

fn manager(algorithm: SigningAlgorithm) -> ClaimManager {
    let config = ClaimsConfig::new(SECRET).unwrap().with_algorithm(algorithm);
    ClaimManager::from_config(config)
}

fn bundle(manager: &ClaimManager, claims: usize) -> ClaimRepositoryData {
    let mut data = ClaimRepositoryData::new(
        IdentityClaim::new("user-42"),
        manager.now() + ChronoDuration::hours(12),
    );
    for i in 0..claims {
        data = data.with_claim(Claim::typed(format!("claim_{i}"), &format!("value-{i}")).unwrap());
    }
    data
}

fn bench_sign(c: &mut Criterion) {
    let mut group = c.benchmark_group("claims_sign");

    for algorithm in [SigningAlgorithm::Hs256, SigningAlgorithm::Hs512] {
        let manager = manager(algorithm);
        for claims in [0, 4, 16] {
            let data = bundle(&manager, claims);
            group.bench_with_input(
                BenchmarkId::new(algorithm.name(), claims),
                &data,
                |b, data| {
                    b.iter(|| manager.serialize(&mut black_box(data.clone())).unwrap());
                },
            );
        }
    }

    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("claims_verify");

    for algorithm in [SigningAlgorithm::Hs256, SigningAlgorithm::Hs512] {
        let manager = manager(algorithm);
        for claims in [0, 4, 16] {
            let token = manager.serialize(&mut bundle(&manager, claims)).unwrap();
            group.bench_with_input(
                BenchmarkId::new(algorithm.name(), claims),
                &token,
                |b, token| {
                    b.iter(|| manager.deserialize(black_box(token)));
                },
            );
        }
    }

    // Rejection paths should stay cheap
    let manager = manager(SigningAlgorithm::Hs256);
    let token = manager.serialize(&mut bundle(&manager, 4)).unwrap();
    let (signed, _) = token.rsplit_once('.').unwrap();
    let forged = format!("{signed}.{}", b64url::encode(&[0u8; 32]));
    group.bench_function("signature_mismatch", |b| {
        b.iter(|| manager.deserialize(black_box(&forged)));
    });
    group.bench_function("malformed", |b| {
        b.iter(|| manager.deserialize(black_box("not.a.token")));
    });

    group.finish();
}

criterion_group!(benches, bench_sign, bench_verify);
criterion_main!(benches);
