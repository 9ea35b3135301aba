use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use socialite_store::{ChangeSet, Mergeable, MergeOptions, MergeableCollection};
use socialite_types::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowField {
    Score,
}

#[derive(Debug, Clone)]
struct Row {
    id: EntityId,
    score: u64,
}

impl Mergeable for Row {
    type Field = RowField;

    fn key(&self) -> &EntityId {
        &self.id
    }

    fn merge_from(&mut self, incoming: Self) -> ChangeSet<RowField> {
        let mut changes = ChangeSet::new();
        changes.update(&mut self.score, incoming.score, RowField::Score);
        changes
    }

    fn repair_key(&mut self, id: EntityId) {
        self.id = id;
    }
}

fn rows(n: usize, salt: u64) -> Vec<Row> {
    (0..n)
        .map(|i| Row {
            id: EntityId::new(format!("row-{i}")),
            score: (i as u64).wrapping_mul(2654435761).wrapping_add(salt) % 10_000,
        })
        .collect()
}

const SIZES: [usize; 3] = [100, 1_000, 5_000];

fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for size in SIZES {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(BenchmarkId::new("fresh", size), |b| {
            b.iter(|| {
                let collection =
                    MergeableCollection::with_comparison(|a: &Row, b: &Row| b.score.cmp(&a.score));
                collection.merge(rows(size, 0), MergeOptions::new())
            })
        });

        let warm = MergeableCollection::with_comparison(|a: &Row, b: &Row| b.score.cmp(&a.score));
        let _ = warm.merge(rows(size, 0), MergeOptions::new());
        group.bench_function(BenchmarkId::new("resort", size), |b| {
            let mut salt = 0;
            b.iter(|| {
                salt += 1;
                warm.merge(rows(size, salt), MergeOptions::new())
            })
        });

        group.bench_function(BenchmarkId::new("unchanged", size), |b| {
            let same = rows(size, 0);
            let collection =
                MergeableCollection::with_comparison(|a: &Row, b: &Row| b.score.cmp(&a.score));
            let _ = collection.merge(same.clone(), MergeOptions::new());
            b.iter(|| collection.merge(same.clone(), MergeOptions::new()))
        });
    }

    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench
);

criterion_main!(benches);
