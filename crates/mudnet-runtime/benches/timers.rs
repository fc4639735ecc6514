use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mudnet_runtime::{Loop, LoopConfig, ManualClock, Timer, TimerKey, TimerSet};
use std::sync::Arc;
use std::time::Duration;

fn timer_set(c: &mut Criterion) {
    c.bench_function("timer_set_insert_pop_1k", |b| {
        b.iter(|| {
            let mut set = TimerSet::new();
            for i in 0..1000u32 {
                set.insert(TimerKey::new(u64::from(i * 7 % 1000), i), i);
            }
            while let Some(entry) = set.pop_expired(black_box(1000)) {
                black_box(entry);
            }
        })
    });
}

fn loop_timers(c: &mut Criterion) {
    let clock = Arc::new(ManualClock::new());
    let lp = Loop::with_clock(LoopConfig::new(), Arc::clone(&clock)).unwrap();
    let timers: Vec<Timer> = (0..256)
        .map(|i| Timer::with_callback(Duration::from_micros(1 + i % 16), true, |_| {}))
        .collect();
    for t in &timers {
        t.start(&lp).unwrap();
    }

    c.bench_function("loop_update_256_repeating", |b| {
        b.iter(|| {
            clock.advance(Duration::from_micros(16));
            lp.update().unwrap();
        })
    });
}

fn cross_thread_execute(c: &mut Criterion) {
    let lp = Loop::with_config(LoopConfig::new()).unwrap();
    c.bench_function("execute_owner_sync", |b| {
        b.iter(|| lp.execute(|| black_box(())))
    });
}

criterion_group!(benches, timer_set, loop_timers, cross_thread_execute);
criterion_main!(benches);
