use criterion::{black_box, criterion_group, criterion_main, Criterion};
use folio_core::{BlockType, Pointer, Record, Role};
use folio_store::{edit, CacheConfig, Command, RecordCacheStore, RecordStore, Transaction};
use serde_json::json;
use std::sync::Arc;

fn cache() -> Arc<RecordCacheStore> {
    Arc::new(RecordCacheStore::new(CacheConfig::default()))
}

fn bench_operation_apply(c: &mut Criterion) {
    let cache = cache();
    let pointer = Pointer::block("bench");
    cache.set_record(&pointer, "alice", Record::new(json!({"content": []}), Role::Editor));
    let store = RecordStore::new(cache.clone(), pointer, "alice");
    let content = store.property_store("content");

    c.bench_function("list_append_1", |b| {
        let mut n = 0u64;
        b.iter(|| {
            let mut tx = Transaction::begin(cache.clone(), "alice");
            n += 1;
            tx.add_operation(
                &content,
                Command::ListAfter { id: black_box(format!("b{n}")), after: None },
            )
            .unwrap();
        })
    });
}

fn bench_field_update(c: &mut Criterion) {
    let cache = cache();
    let pointer = Pointer::block("bench");
    cache.set_record(&pointer, "alice", Record::new(json!({"type": "text"}), Role::Editor));
    let store = RecordStore::new(cache.clone(), pointer, "alice");

    c.bench_function("update_field", |b| {
        b.iter(|| {
            let mut tx = Transaction::begin(cache.clone(), "alice");
            tx.add_operation(&store, Command::Update(black_box(json!({"version": 2}))))
                .unwrap();
        })
    });
}

fn bench_property_store_derivation(c: &mut Criterion) {
    let cache = cache();
    let store = RecordStore::new(cache, Pointer::block("bench"), "alice");

    // Memoized path: repeated derivation of the same child.
    c.bench_function("property_store_memoized", |b| {
        b.iter(|| {
            black_box(store.property_store(black_box("content")));
        })
    });
}

fn bench_projected_read(c: &mut Criterion) {
    let cache = cache();
    let pointer = Pointer::block("bench");
    cache.set_record(
        &pointer,
        "alice",
        Record::new(json!({"a": {"b": {"c": [1, 2, 3]}}}), Role::Editor),
    );
    let store = RecordStore::new(cache, pointer, "alice");
    let nested = store.property_store("a").property_store("b").property_store("c");

    c.bench_function("projected_read_warm", |b| {
        b.iter(|| {
            black_box(nested.get_value());
        })
    });
}

fn bench_gesture(c: &mut Criterion) {
    c.bench_function("gesture_create_page_with_10_children", |b| {
        b.iter(|| {
            let cache = cache();
            let mut tx = Transaction::begin(cache, "alice");
            let page = edit::create_block(&mut tx, BlockType::Page).unwrap();
            for _ in 0..10 {
                let child = edit::create_block(&mut tx, BlockType::Text).unwrap();
                edit::append_child(&mut tx, &page, &child).unwrap();
            }
            black_box(tx.commit().unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_operation_apply,
    bench_field_update,
    bench_property_store_derivation,
    bench_projected_read,
    bench_gesture
);
criterion_main!(benches);
