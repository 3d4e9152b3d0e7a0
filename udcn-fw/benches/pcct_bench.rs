use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;
use udcn_core::{Data, Interest, Name, Packet};
use udcn_fw::{FaceTable, Fib, FwConfig, FwDeps, FwFwd, ManualClock, Pcct, PitInsertResult};

const NOW: u64 = 1_000_000;

fn names(n: usize) -> Vec<Name> {
    (0..n)
        .map(|i| Name::from_uri(&format!("/bench/prefix/{}/seg={}", i % 97, i)).unwrap())
        .collect()
}

fn config() -> FwConfig {
    let mut config = FwConfig::default();
    config.pcct.capacity = 4096;
    config.pcct.key_ext_capacity = 512;
    config.cs.capacity = 1024;
    config
}

fn benchmark_pcct(c: &mut Criterion) {
    let interests: Vec<Interest> = names(1024)
        .into_iter()
        .enumerate()
        .map(|(i, name)| Interest::new(name).with_nonce(i as u32))
        .collect();

    c.bench_function("pit_insert_erase", |b| {
        let mut pcct = Pcct::new(&config(), NOW);
        b.iter(|| {
            for interest in &interests {
                if let PitInsertResult::Pit(h) = pcct.pit().insert(black_box(interest), None, NOW) {
                    pcct.pit().erase(h);
                }
            }
        })
    });

    c.bench_function("pit_insert_existing", |b| {
        let mut pcct = Pcct::new(&config(), NOW);
        let interest = &interests[0];
        pcct.pit().insert(interest, None, NOW);
        b.iter(|| pcct.pit().insert(black_box(interest), None, NOW))
    });
}

fn benchmark_fwd(c: &mut Criterion) {
    let faces = Arc::new(FaceTable::new());
    faces.add(1, 4096).unwrap();
    faces.add(2, 4096).unwrap();
    let fib = Arc::new(Fib::new());
    fib.insert(Name::from_uri("/bench").unwrap(), vec![2], 0).unwrap();
    let clock = ManualClock::new(NOW);
    let deps = FwDeps::new(fib, faces.clone(), Arc::new(clock));
    let names = names(256);

    c.bench_function("fwd_interest_data_round_trip", |b| {
        let mut fwd = FwFwd::new(0, &config(), &deps);
        let mut nonce = 0u32;
        b.iter_batched(
            || {
                nonce = nonce.wrapping_add(1);
                (names[nonce as usize % names.len()].clone(), nonce)
            },
            |(name, nonce)| {
                let interest = Interest::new(name.clone()).with_nonce(nonce);
                fwd.rx_packet(Packet::interest(1, interest));
                for up in faces.drain(2) {
                    let data = Data::new(name.clone(), "bench payload");
                    fwd.rx_packet(Packet::data(2, data, up.lp.pit_token));
                }
                black_box(faces.drain(1));
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, benchmark_pcct, benchmark_fwd);
criterion_main!(benches);
