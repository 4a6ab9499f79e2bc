use crate::error::{AppError, Result};
use crate::ml::models::TrainingDataset;
use crate::models::DamageLevel;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Stratified train/test partition.
///
/// `round(n * test_fraction)` samples go to the test set. Each class receives
/// its proportional share of the test set (largest-remainder rounding, so every
/// class is within one sample of its exact share), with at least one sample of
/// every present class in each partition. Row selection inside a class follows
/// a permutation drawn from an RNG seeded with `seed`, so identical input and
/// seed always yield the identical split.
pub fn stratified_split(
    dataset: &TrainingDataset,
    test_fraction: f64,
    seed: u64,
) -> Result<(TrainingDataset, TrainingDataset)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(AppError::InvalidInput(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let n = dataset.n_samples;
    let counts = dataset.class_counts();

    for level in DamageLevel::ALL {
        let count = counts[level.index()];
        if count == 1 {
            return Err(AppError::InsufficientData(format!(
                "class '{}' has only 1 sample, at least 2 are needed to appear in both train and test sets",
                level
            )));
        }
    }

    let present = counts.iter().filter(|&&c| c > 0).count();
    let n_test = (n as f64 * test_fraction).round() as usize;
    if n_test < present || n.saturating_sub(n_test) < present {
        return Err(AppError::InsufficientData(format!(
            "cannot stratify {} samples of {} classes with test fraction {}: \
             test size {} leaves no room for every class in both sets",
            n, present, test_fraction, n_test
        )));
    }

    let allocation = allocate_test_counts(&counts, n_test);

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut taken = [0usize; DamageLevel::COUNT];
    let mut train_idx = Vec::with_capacity(n - n_test);
    let mut test_idx = Vec::with_capacity(n_test);

    for i in order {
        let class = dataset.labels[i].index();
        if taken[class] < allocation[class] {
            taken[class] += 1;
            test_idx.push(i);
        } else {
            train_idx.push(i);
        }
    }

    tracing::debug!(
        train = train_idx.len(),
        test = test_idx.len(),
        allocation = ?allocation,
        "Stratified split complete"
    );

    Ok((dataset.select(&train_idx), dataset.select(&test_idx)))
}

/// Per-class test counts summing to `n_test`, each within [1, count - 1] for
/// present classes and 0 for absent ones.
fn allocate_test_counts(
    counts: &[usize; DamageLevel::COUNT],
    n_test: usize,
) -> [usize; DamageLevel::COUNT] {
    let n: usize = counts.iter().sum();
    let quota: Vec<f64> = counts
        .iter()
        .map(|&c| n_test as f64 * c as f64 / n as f64)
        .collect();

    let mut alloc = [0usize; DamageLevel::COUNT];
    for (class, q) in quota.iter().enumerate() {
        alloc[class] = q.floor() as usize;
    }

    // Hand out the remaining seats by largest fractional part; ties resolve
    // to the earlier class in the fixed ordering.
    let mut by_remainder: Vec<usize> = (0..DamageLevel::COUNT)
        .filter(|&class| counts[class] > 0)
        .collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = quota[a] - quota[a].floor();
        let rb = quota[b] - quota[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    let assigned: usize = alloc.iter().sum();
    for &class in by_remainder.iter().take(n_test - assigned) {
        alloc[class] += 1;
    }

    // Every present class must land in both partitions.
    for class in 0..DamageLevel::COUNT {
        if counts[class] > 0 {
            alloc[class] = alloc[class].clamp(1, counts[class] - 1);
        }
    }

    // Clamping can move the total off n_test; rebalance one seat at a time,
    // taking from the class furthest above its quota or giving to the class
    // furthest below it.
    loop {
        let total: usize = alloc.iter().sum();
        if total == n_test {
            break;
        }

        let candidate = if total > n_test {
            pick(&quota, |class| alloc[class] > 1 && counts[class] > 0, |class| {
                alloc[class] as f64 - quota[class]
            })
        } else {
            pick(
                &quota,
                |class| counts[class] > 0 && alloc[class] + 1 < counts[class],
                |class| quota[class] - alloc[class] as f64,
            )
        };

        match candidate {
            Some(class) if total > n_test => alloc[class] -= 1,
            Some(class) => alloc[class] += 1,
            // Unreachable given the size checks in stratified_split
            None => break,
        }
    }

    alloc
}

/// First class (in the fixed ordering) maximising `score` among `eligible`
fn pick(
    quota: &[f64],
    eligible: impl Fn(usize) -> bool,
    score: impl Fn(usize) -> f64,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for class in 0..quota.len() {
        if !eligible(class) {
            continue;
        }
        let s = score(class);
        match best {
            Some((_, best_score)) if s <= best_score => {}
            _ => best = Some((class, s)),
        }
    }
    best.map(|(class, _)| class)
}
