use super::rolling_sum;

/// Money flow index on typical price and volume.
pub fn mfi(high: &[f64], low: &[f64], close: &[f64], volume: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let tp: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
    let mut pos = vec![f64::NAN; n];
    let mut neg = vec![f64::NAN; n];
    for i in 1..n {
        let flow = tp[i] * volume[i];
        let (p, m) = if tp[i] > tp[i - 1] {
            (flow, 0.0)
        } else if tp[i] < tp[i - 1] {
            (0.0, flow)
        } else {
            (0.0, 0.0)
        };
        pos[i] = p;
        neg[i] = m;
    }
    let pos_sum = rolling_sum(&pos, period);
    let neg_sum = rolling_sum(&neg, period);
    pos_sum
        .iter()
        .zip(&neg_sum)
        .map(|(p, m)| {
            if p.is_nan() || m.is_nan() {
                f64::NAN
            } else if p + m == 0.0 {
                50.0
            } else {
                100.0 * p / (p + m)
            }
        })
        .collect()
}

/// Volume relative to its trailing average.
pub fn relative_volume(volume: &[f64], period: usize) -> Vec<f64> {
    let avg = super::sma(volume, period);
    volume.iter().zip(&avg).map(|(v, a)| v / a).collect()
}
