use super::ema;

#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema(prices, fast);
    let slow_ema = ema(prices, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema(&line, signal);
    let histogram = line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();
    MacdSeries {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

/// True on rows where `a` crosses above `b`.
pub fn crossed_above(a: &[f64], b: &[f64]) -> Vec<bool> {
    (0..a.len())
        .map(|i| i > 0 && a[i] > b[i] && a[i - 1] <= b[i - 1])
        .collect()
}

pub fn crossed_below(a: &[f64], b: &[f64]) -> Vec<bool> {
    (0..a.len())
        .map(|i| i > 0 && a[i] < b[i] && a[i - 1] >= b[i - 1])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_warmup_and_histogram() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let out = macd(&prices, 12, 26, 9);
        assert!(out.macd[24].is_nan());
        assert!(out.macd[25].is_finite());
        assert!(out.signal[32].is_nan());
        assert!(out.signal[33].is_finite());
        assert!((out.histogram[50] - (out.macd[50] - out.signal[50])).abs() < 1e-12);
    }

    #[test]
    fn test_crossings() {
        let a = [0.0, 2.0, 1.0, 3.0];
        let b = [1.0, 1.0, 2.0, 2.0];
        assert_eq!(crossed_above(&a, &b), vec![false, true, false, true]);
        assert_eq!(crossed_below(&a, &b), vec![false, false, true, false]);
    }
}
