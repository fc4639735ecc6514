use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mudnet_core::{BufferPool, ObjectPool};

fn buffer_pool(c: &mut Criterion) {
    let pool = BufferPool::new();
    pool.release(pool.acquire(65536));

    c.bench_function("buffer_pool_acquire_release_64k", |b| {
        b.iter(|| {
            let buf = pool.acquire(black_box(65536));
            pool.release(buf);
        })
    });

    c.bench_function("heap_alloc_64k", |b| {
        b.iter(|| black_box(vec![0u8; black_box(65536)].into_boxed_slice()))
    });
}

fn object_pool(c: &mut Criterion) {
    let pool: ObjectPool<Vec<u8>> = ObjectPool::new(64);
    c.bench_function("object_pool_acquire_release", |b| {
        b.iter(|| {
            let mut v = pool.acquire();
            v.extend_from_slice(black_box(b"ping"));
            v.clear();
            pool.release(v);
        })
    });
}

criterion_group!(benches, buffer_pool, object_pool);
criterion_main!(benches);
