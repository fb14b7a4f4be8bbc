//! Node creation with auto-linking, and the read paths the loops hit

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;

use clockchain_graph::{GraphStore, Node, NodeDraft, SearchConfig};

const CITIES: [&str; 8] = [
    "rome", "paris", "cairo", "athens", "london", "berlin", "kyoto", "lima",
];
const TAGS: [&str; 6] = ["war", "science", "art", "religion", "trade", "politics"];

fn draft(i: usize) -> NodeDraft {
    Node::builder()
        .date(1800 + (i % 200) as i32, (i % 12) as u8 + 1, (i % 28) as u8 + 1)
        .location("testland", "region", CITIES[i % CITIES.len()])
        .name(format!("moment {}", i))
        .tag(TAGS[i % TAGS.len()])
        .public()
        .build()
        .expect("valid draft")
}

fn populated(n: usize) -> (TempDir, GraphStore) {
    let dir = TempDir::new().expect("temp dir");
    let store = GraphStore::open(dir.path()).expect("open store");
    for i in 0..n {
        store.add_node(draft(i)).expect("add node");
    }
    (dir, store)
}

fn bench_add_node_auto_link(c: &mut Criterion) {
    let (_dir, store) = populated(1_000);
    let mut next = 1_000;
    c.bench_function("add_node_auto_link_1k", |b| {
        b.iter_batched(
            || {
                next += 1;
                draft(next)
            },
            |d| store.add_node(black_box(d)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_frontier(c: &mut Criterion) {
    let (_dir, store) = populated(1_000);
    c.bench_function("frontier_1k", |b| b.iter(|| store.frontier(black_box(3))));
}

fn bench_search(c: &mut Criterion) {
    let (_dir, store) = populated(1_000);
    let config = SearchConfig::default();
    c.bench_function("search_1k", |b| {
        b.iter(|| store.search(black_box("moment 5"), &config))
    });
}

criterion_group!(benches, bench_add_node_auto_link, bench_frontier, bench_search);
criterion_main!(benches);
