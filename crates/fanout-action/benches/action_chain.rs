//! Action engine benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use fanout_action::{action, ActionChain, GroupContext, Packet};

fn bench_combinators(c: &mut Criterion) {
    let group = GroupContext::with_capacity(16, 16, 4);

    c.bench_function("deliver", |b| {
        b.iter(|| {
            let pkt = Packet::new(black_box(0u32), &group);
            black_box(action::deliver(pkt, black_box(0b11)).into_inner().fanout())
        })
    });

    c.bench_function("counter_inc", |b| {
        let pkt = Packet::new(0u32, &group);
        b.iter(|| action::get_counter(&pkt, black_box(3)).map(|c| c.inc()))
    });

    c.bench_function("persistent_rw", |b| {
        let pkt = Packet::new(0u32, &group);
        b.iter(|| {
            if let Some(mut n) = action::get_persistent::<u64, _>(&pkt, black_box(1)) {
                *n += 1;
                action::put_persistent(n);
            }
        })
    });
}

fn bench_chain_throughput(c: &mut Criterion) {
    let ctx = GroupContext::with_capacity(16, 16, 4);
    let mut chain = ActionChain::<[u8; 64]>::new();
    chain
        .push("count", |b| {
            if let Some(c) = action::get_counter(&b, 0) {
                c.inc();
            }
            action::pass(b)
        })
        .push("steer", |b| {
            let hash = u32::from_be_bytes([b.buf[26], b.buf[27], b.buf[28], b.buf[29]]);
            action::dispatch(b, 0b1111, hash)
        });

    let packets: Vec<[u8; 64]> = (0..64u32)
        .map(|i| {
            let mut p = [0u8; 64];
            p[26..30].copy_from_slice(&i.to_be_bytes());
            p
        })
        .collect();

    let mut group = c.benchmark_group("chain_throughput");
    group.throughput(Throughput::Elements(packets.len() as u64));
    group.bench_function("64_packets", |b| {
        b.iter(|| {
            let mut steered = 0u64;
            for pkt in &packets {
                let f = chain.fanout(Packet::new(*pkt, &ctx));
                steered += f.hash as u64;
            }
            black_box(steered)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_combinators, bench_chain_throughput);
criterion_main!(benches);
