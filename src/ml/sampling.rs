use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a class-balanced training sample.
///
/// Positive labels are sparse, so the sample keeps every entry and exit row
/// unless together they would exceed two thirds of `size`, and fills the rest
/// with rows that carry neither signal. The result is shuffled.
pub fn viable_sample(size: usize, entries: &[f64], exits: &[f64], rng: &mut StdRng) -> Vec<usize> {
    let mut entry_rows: Vec<usize> = (0..entries.len()).filter(|&i| entries[i] > 0.5).collect();
    let mut exit_rows: Vec<usize> = (0..exits.len())
        .filter(|&i| exits[i] > 0.5 && entries[i] <= 0.5)
        .collect();
    let mut quiet_rows: Vec<usize> = (0..entries.len())
        .filter(|&i| entries[i] <= 0.5 && exits[i] <= 0.5)
        .collect();

    let mut max_signals = 2 * size / 3;
    if max_signals > quiet_rows.len() {
        max_signals = size.saturating_sub(quiet_rows.len()).saturating_sub(1);
    }

    let mut entry_size = entry_rows.len();
    let mut exit_size = exit_rows.len();
    if entry_size + exit_size > max_signals {
        let half = max_signals / 2;
        if entry_size > half && exit_size > half {
            entry_size = half;
            exit_size = half;
        } else if entry_size > exit_size {
            entry_size = max_signals.saturating_sub(exit_size);
        } else {
            exit_size = max_signals.saturating_sub(entry_size);
        }
    }

    entry_rows.shuffle(rng);
    entry_rows.truncate(entry_size);
    exit_rows.shuffle(rng);
    exit_rows.truncate(exit_size);

    let fill = size.saturating_sub(entry_rows.len() + exit_rows.len() + 1);
    quiet_rows.shuffle(rng);
    quiet_rows.truncate(fill);

    let mut rows = entry_rows;
    rows.extend(exit_rows);
    rows.extend(quiet_rows);
    rows.shuffle(rng);
    rows
}

/// Shuffled train/test split of `0..n` with a fixed seed.
pub fn train_test_split(n: usize, train_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rows: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
    let train_size = ((n as f64) * train_fraction) as usize;
    let test = rows.split_off(train_size.min(n));
    (rows, test)
}

pub fn pick(values: &[f64], rows: &[usize]) -> Vec<f64> {
    rows.iter().map(|&i| values[i]).collect()
}

pub fn positives(labels: &[f64]) -> usize {
    labels.iter().filter(|&&v| v > 0.5).count()
}
