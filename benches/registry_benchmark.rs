use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use switchboard::signaling::{ConnectionId, Registry, ServerMessage, Transport};

/// Discards everything, but still forces the message to be built
struct NullTransport;

impl Transport for NullTransport {
    fn send_to(&mut self, target: ConnectionId, msg: &ServerMessage) {
        black_box((target, msg));
    }

    fn broadcast(&mut self, msg: &ServerMessage) {
        black_box(msg);
    }
}

fn populated_registry(users: usize) -> (Registry, Vec<ConnectionId>) {
    let mut registry = Registry::new();
    let ids: Vec<ConnectionId> = (0..users)
        .map(|i| ConnectionId::from(format!("conn_{:08x}", i).as_str()))
        .collect();
    for (i, id) in ids.iter().enumerate() {
        registry.join(&mut NullTransport, *id, format!("user{}", i));
    }
    (registry, ids)
}

/// ring, accept, exchange a signal, hang up
fn bench_call_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("CallCycle");
    group.throughput(Throughput::Elements(1));

    for users in [2usize, 64, 512] {
        let (mut registry, ids) = populated_registry(users);
        let (a, b) = (ids[0], ids[1]);

        group.bench_with_input(BenchmarkId::from_parameter(users), &users, |bench, _| {
            bench.iter(|| {
                let out = &mut NullTransport;
                registry.call_user(out, a, b);
                registry.answer_call(out, true, b, a);
                registry.send_signal(out, a, b, black_box("v=0".to_string()));
                registry.hang_up(out, a);
            })
        });
    }

    group.finish();
}

/// cost of a signal relay while many calls are active
fn bench_signal_relay(c: &mut Criterion) {
    let (mut registry, ids) = populated_registry(512);
    for pair in ids.chunks_exact(2) {
        registry.call_user(&mut NullTransport, pair[0], pair[1]);
        registry.answer_call(&mut NullTransport, true, pair[1], pair[0]);
    }
    let (a, b) = (ids[510], ids[511]);

    let mut group = c.benchmark_group("SignalRelay");
    group.throughput(Throughput::Elements(1));

    group.bench_function("256 active calls", |bench| {
        bench.iter(|| {
            registry.send_signal(&mut NullTransport, a, b, black_box("candidate".to_string()))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_call_cycle, bench_signal_relay);
criterion_main!(benches);
