use super::Indicator;

/// Wilder-smoothed average true range.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    true_ranges: Vec<f64>,
    value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            true_ranges: Vec::with_capacity(period),
            value: None,
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let tr = true_range(high, low, self.prev_close);
        let first = self.prev_close.is_none();
        self.prev_close = Some(close);
        // the first bar has no previous close and is not counted
        if first {
            return None;
        }

        match self.value {
            None => {
                self.true_ranges.push(tr);
                if self.true_ranges.len() == self.period {
                    self.value = Some(self.true_ranges.iter().sum::<f64>() / self.period as f64);
                }
            }
            Some(prev) => {
                let p = self.period as f64;
                self.value = Some((prev * (p - 1.0) + tr) / p);
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Indicator for Atr {
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.true_ranges.clear();
        self.value = None;
    }
}

pub fn true_range(high: f64, low: f64, prev_close: Option<f64>) -> f64 {
    let hl = high - low;
    match prev_close {
        Some(pc) => hl.max((high - pc).abs()).max((low - pc).abs()),
        None => hl,
    }
}

pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let mut state = Atr::new(period.max(1));
    (0..close.len())
        .map(|i| state.update(high[i], low[i], close[i]).unwrap_or(f64::NAN))
        .collect()
}

/// Directional movement system: smoothed DM, DI and ADX.
#[derive(Debug, Clone)]
pub struct Directional {
    pub dm_plus: Vec<f64>,
    pub dm_minus: Vec<f64>,
    pub di_plus: Vec<f64>,
    pub di_minus: Vec<f64>,
    pub adx: Vec<f64>,
}

pub fn directional(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Directional {
    let n = close.len();
    let mut out = Directional {
        dm_plus: vec![f64::NAN; n],
        dm_minus: vec![f64::NAN; n],
        di_plus: vec![f64::NAN; n],
        di_minus: vec![f64::NAN; n],
        adx: vec![f64::NAN; n],
    };
    if period == 0 || n <= period {
        return out;
    }

    let p = period as f64;
    let (mut s_plus, mut s_minus, mut s_tr) = (0.0, 0.0, 0.0);
    let mut dx_seed = Vec::with_capacity(period);
    let mut adx: Option<f64> = None;

    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        let plus = if up > down && up > 0.0 { up } else { 0.0 };
        let minus = if down > up && down > 0.0 { down } else { 0.0 };
        let tr = true_range(high[i], low[i], Some(close[i - 1]));

        if i <= period {
            s_plus += plus;
            s_minus += minus;
            s_tr += tr;
            if i < period {
                continue;
            }
        } else {
            s_plus = s_plus - s_plus / p + plus;
            s_minus = s_minus - s_minus / p + minus;
            s_tr = s_tr - s_tr / p + tr;
        }

        out.dm_plus[i] = s_plus;
        out.dm_minus[i] = s_minus;
        let (di_p, di_m) = if s_tr > 0.0 {
            (100.0 * s_plus / s_tr, 100.0 * s_minus / s_tr)
        } else {
            (0.0, 0.0)
        };
        out.di_plus[i] = di_p;
        out.di_minus[i] = di_m;

        let sum = di_p + di_m;
        let dx = if sum > 0.0 { 100.0 * (di_p - di_m).abs() / sum } else { 0.0 };
        adx = match adx {
            Some(prev) => Some((prev * (p - 1.0) + dx) / p),
            None => {
                dx_seed.push(dx);
                if dx_seed.len() == period {
                    Some(dx_seed.iter().sum::<f64>() / p)
                } else {
                    None
                }
            }
        };
        if let Some(v) = adx {
            out.adx[i] = v;
        }
    }
    out
}
