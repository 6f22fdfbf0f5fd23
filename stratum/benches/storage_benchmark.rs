use std::cmp::Ordering;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stratum::pager::Pager;
use stratum::{AccessType, BPlusTree, BufferPoolManager, TupleId};
use tempfile::TempDir;

fn key_cmp(a: &i64, b: &i64) -> Ordering {
    a.cmp(b)
}

fn setup_bpm(dir: &TempDir, pool_size: usize) -> Arc<BufferPoolManager> {
    let pager = Pager::open(dir.path().join("bench.db")).unwrap();
    Arc::new(BufferPoolManager::new(pager, pool_size, 2))
}

fn benchmark_fetch_page(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let bpm = setup_bpm(&dir, 64);

    // Twice as many pages as frames, so half the fetches hit disk.
    let page_ids: Vec<_> = (0..128)
        .map(|_| bpm.new_page().unwrap().page_id())
        .collect();

    let mut cursor = 0;
    c.bench_function("buffer_pool_fetch_page", |b| {
        b.iter(|| {
            let page_id = page_ids[cursor % page_ids.len()];
            cursor += 7;
            let guard = bpm.fetch_page(black_box(page_id), AccessType::Lookup).unwrap();
            black_box(guard.page_id());
        })
    });
}

fn benchmark_btree_insert(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let bpm = setup_bpm(&dir, 256);
    let header_page_id = bpm.new_page().unwrap().page_id();
    let tree: BPlusTree<i64, TupleId> =
        BPlusTree::new("bench_insert", header_page_id, Arc::clone(&bpm), key_cmp, 64, 64).unwrap();

    let mut key = 0i64;
    c.bench_function("btree_insert_ascending", |b| {
        b.iter(|| {
            tree.insert(black_box(key), (key as u32, 0)).unwrap();
            key += 1;
        })
    });
}

fn benchmark_btree_get(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let bpm = setup_bpm(&dir, 256);
    let header_page_id = bpm.new_page().unwrap().page_id();
    let tree: BPlusTree<i64, TupleId> =
        BPlusTree::new("bench_get", header_page_id, Arc::clone(&bpm), key_cmp, 64, 64).unwrap();

    let total = 10_000i64;
    for key in 0..total {
        tree.insert(key, (key as u32, 0)).unwrap();
    }

    let mut key = 0i64;
    c.bench_function("btree_point_get", |b| {
        b.iter(|| {
            let probe = key % total;
            key += 131;
            black_box(tree.get(black_box(&probe)).unwrap());
        })
    });
}

criterion_group!(
    benches,
    benchmark_fetch_page,
    benchmark_btree_insert,
    benchmark_btree_get
);
criterion_main!(benches);
