pub mod cache;
pub mod record;

pub use cache::ModelCache;
pub use record::{ModelRecord, ModelState};

use std::collections::HashSet;
use std::sync::Arc;

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{FitAbort, PipelineError, Result, Target};
use crate::indicators::IndicatorEngine;
use crate::labels::{LabelBuilder, LabelPolicy, LabelSet};
use crate::ml::sampling::{pick, positives, train_test_split, viable_sample};
use crate::ml::{
    build_reducer, BinaryClassifier, ClassificationReport, ClassifierLedger, ClassifierSelector, FeatureNormalizer,
    FitProtocol, OutlierPolicy, Reducer,
};
use crate::types::{CandleSeries, FeatureFrame};
use self::record::FittedModels;

/// Builds an unfitted reducer for an instrument.
pub type ReducerFactory = Arc<dyn Fn(&str) -> Box<dyn Reducer> + Send + Sync>;

type FitOutcome = std::result::Result<FittedModels, FitAbort>;

/// Seed for the retrain countdown of one (pair, attempt). Stable across
/// platforms and toolchains.
pub fn interval_seed(random_seed: u64, pair: &str, generation: u64) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&random_seed.to_le_bytes());
    hasher.update(pair.as_bytes());
    hasher.update(&generation.to_le_bytes());
    let hash = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(seed)
}

/// Per-instrument online signal prediction.
///
/// Each call to [`populate`](Self::populate) computes the feature frame for a
/// candle window, retrains the instrument's models when its countdown runs
/// out, and appends `predict_entry` / `predict_exit` scores in [0, 1].
pub struct SignalPipeline {
    config: PipelineConfig,
    engine: IndicatorEngine,
    labels: LabelBuilder,
    normalizer: FeatureNormalizer,
    selector: ClassifierSelector,
    ledger: Arc<ClassifierLedger>,
    reducers: ReducerFactory,
}

impl SignalPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| PipelineError::InvalidConfig(errors.join("; ")))?;

        let selector = ClassifierSelector::from_settings(&config.model)?;
        let settings = config.model.clone();
        let reducers: ReducerFactory = Arc::new(move |pair: &str| build_reducer(&settings, pair));

        info!(
            "Signal pipeline: lookahead {} candles, reducer {:?}, strategy {:?}",
            config.lookahead(),
            config.model.reducer,
            selector.strategy()
        );

        Ok(Self {
            engine: IndicatorEngine::new(&config),
            labels: LabelBuilder::new(&config),
            normalizer: FeatureNormalizer::new(&config.normalize),
            selector,
            ledger: Arc::new(ClassifierLedger::new()),
            reducers,
            config,
        })
    }

    pub fn with_label_policy(mut self, policy: Arc<dyn LabelPolicy>) -> Self {
        self.labels = self.labels.with_policy(policy);
        self
    }

    pub fn with_reducer_factory(mut self, factory: ReducerFactory) -> Self {
        self.reducers = factory;
        self
    }

    /// Share a ledger across pipelines.
    pub fn with_ledger(mut self, ledger: Arc<ClassifierLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ClassifierLedger {
        &self.ledger
    }

    /// Compute features and predictions for one instrument.
    ///
    /// Data problems during training abort only the current cycle and leave
    /// neutral predictions; errors are reserved for misuse.
    pub fn populate(&self, pair: &str, candles: &CandleSeries, record: &mut ModelRecord) -> Result<FeatureFrame> {
        let mut frame = self.engine.compute(candles)?;

        let mut label_set = None;
        if record.tick() {
            label_set = Some(self.train(pair, &frame, record)?);
        }

        let (entry, exit) = self.predict(pair, &frame, record)?;
        frame.insert("predict_entry", entry)?;
        frame.insert("predict_exit", exit)?;

        // diagnostics go on after prediction so they never reach a model
        if self.config.debug.debug_columns {
            if let Some(labels) = &label_set {
                for (name, values) in labels.debug_columns() {
                    frame.insert(name, values)?;
                }
            }
        }
        Ok(frame)
    }

    /// Process several instruments in parallel. Each record is moved out of
    /// the cache for the duration of its job, so no two workers ever share
    /// one. A failure on one instrument does not affect the others.
    pub fn process_batch(
        &self,
        cache: &mut ModelCache,
        batch: Vec<(String, CandleSeries)>,
    ) -> Result<Vec<(String, Result<FeatureFrame>)>> {
        let mut seen = HashSet::new();
        if let Some((pair, _)) = batch.iter().find(|(pair, _)| !seen.insert(pair.as_str())) {
            return Err(PipelineError::InvalidConfig(format!("pair {} appears twice in one batch", pair)));
        }

        let mut jobs: Vec<(String, CandleSeries, ModelRecord)> = batch
            .into_iter()
            .map(|(pair, candles)| {
                let record = cache.take(&pair);
                (pair, candles, record)
            })
            .collect();

        let frames: Vec<Result<FeatureFrame>> = jobs
            .par_iter_mut()
            .map(|(pair, candles, record)| self.populate(pair, candles, record))
            .collect();

        let mut results = Vec::with_capacity(frames.len());
        for ((pair, _, record), frame) in jobs.into_iter().zip(frames) {
            if let Err(e) = &frame {
                warn!("{}: {}", pair, e);
            }
            cache.insert(pair.clone(), record);
            results.push((pair, frame));
        }
        Ok(results)
    }

    /// One training attempt. The countdown is always re-armed, whatever the
    /// outcome; a failed attempt leaves the record Skipped.
    fn train(&self, pair: &str, frame: &FeatureFrame, record: &mut ModelRecord) -> Result<LabelSet> {
        let interval = self.next_interval(pair, record.generation() + 1);
        let (prev_entry, prev_exit) = record.begin_training(interval);

        let outcome = self.labels.build(frame).and_then(|labels| {
            let fitted = self.fit(pair, frame, &labels, prev_entry, prev_exit)?;
            Ok((labels, fitted))
        });
        let (labels, fitted) = match outcome {
            Ok(done) => done,
            Err(e) => {
                // the models are already cleared, so the record must not stay Ready
                record.abort(FitAbort::Failed(e.to_string()));
                record.cap_interval(self.config.schedule.skipped_retry_cap);
                return Err(e);
            }
        };
        match fitted {
            Ok(models) => {
                info!(
                    "{}: trained {} -> {} dims, entry: {}, exit: {}, next in {} candles",
                    pair,
                    models.reducer.name(),
                    models.reducer.dim(),
                    models.entry_name,
                    models.exit_name,
                    interval
                );
                record.install(models);
            }
            Err(reason) => {
                warn!("{}: training skipped: {}", pair, reason);
                record.abort(reason);
            }
        }
        Ok(labels)
    }

    /// Bounded pseudo-random countdown, reproducible per pair and attempt.
    fn next_interval(&self, pair: &str, generation: u64) -> u32 {
        let schedule = &self.config.schedule;
        let upper = schedule.max_interval_floor.max(self.config.lookahead() as u32);
        let mut rng = StdRng::seed_from_u64(interval_seed(self.config.model.random_seed, pair, generation));
        rng.gen_range(schedule.min_interval..=upper)
    }

    fn fit(
        &self,
        pair: &str,
        frame: &FeatureFrame,
        labels: &LabelSet,
        prev_entry: Option<Arc<dyn BinaryClassifier>>,
        prev_exit: Option<Arc<dyn BinaryClassifier>>,
    ) -> Result<FitOutcome> {
        let settings = &self.config.model;

        // the last rows have no future to label
        let rows = frame.len().saturating_sub(self.labels.lookahead());
        let train_frame = frame.head(rows);
        let entries = labels.entries[..rows].to_vec();
        let exits = labels.exits[..rows].to_vec();

        let n_entries = positives(&entries);
        if n_entries < 2 {
            return Ok(Err(FitAbort::InsufficientEntries(n_entries)));
        }
        let n_exits = positives(&exits);
        if n_exits < 2 {
            return Ok(Err(FitAbort::InsufficientExits(n_exits)));
        }

        let (scaler, scaled) = self.normalizer.fit_transform(&train_frame)?;
        let (scaled, entries, exits) = match self.normalizer.outlier_policy() {
            OutlierPolicy::Clip => (scaled, entries, exits),
            OutlierPolicy::RemoveRows => self.normalizer.remove_outliers(&scaled, &entries, &exits)?,
        };

        let mut rng = StdRng::seed_from_u64(settings.random_seed);
        let size = settings.max_train_rows.min(scaled.len());
        let sample = viable_sample(size, &entries, &exits, &mut rng);
        if sample.len() < 10 {
            return Ok(Err(FitAbort::TooFewRows(sample.len())));
        }
        let data = scaled.select_rows(&sample).to_matrix();
        let entries = pick(&entries, &sample);
        let exits = pick(&exits, &sample);

        let (train, test) = train_test_split(sample.len(), 0.8, settings.random_seed);
        let x_train = data.select(Axis(0), &train);
        let x_test = data.select(Axis(0), &test);
        let entry_train = pick(&entries, &train);
        let exit_train = pick(&exits, &train);

        let mut reducer = (self.reducers)(pair);
        let fit_data = if reducer.prefers_clean_data() && settings.clean_data_required {
            let clean: Vec<usize> = (0..train.len())
                .filter(|&i| entry_train[i] <= 0.5 && exit_train[i] <= 0.5)
                .collect();
            x_train.select(Axis(0), &clean)
        } else {
            x_train.clone()
        };
        let dim = reducer.fit(&fit_data)?;
        if dim <= 1 {
            return Ok(Err(FitAbort::ReducerCollapsed(dim)));
        }
        let z_train = reducer.transform(&x_train)?;
        debug!("{}: {} reduced {} -> {} columns", pair, reducer.name(), x_train.ncols(), dim);

        for (target, y) in [(Target::Entry, &entry_train), (Target::Exit, &exit_train)] {
            let ratio_pct = 100.0 * positives(y) as f64 / y.len().max(1) as f64;
            if ratio_pct < settings.min_positive_ratio_pct {
                return Ok(Err(FitAbort::LowPositiveRatio { target, ratio_pct }));
            }
        }

        let protocol = |prev: Option<Arc<dyn BinaryClassifier>>| match prev {
            Some(clf) => FitProtocol::WarmRefit(clf.clone_box()),
            None => FitProtocol::Select,
        };
        let (Some(entry), entry_name) =
            self.selector
                .fit(protocol(prev_entry), &z_train, &entry_train, Target::Entry, &self.ledger)?
        else {
            return Ok(Err(FitAbort::NoClassifier(Target::Entry)));
        };
        let (Some(exit), exit_name) =
            self.selector
                .fit(protocol(prev_exit), &z_train, &exit_train, Target::Exit, &self.ledger)?
        else {
            return Ok(Err(FitAbort::NoClassifier(Target::Exit)));
        };

        if self.config.debug.test_classifier {
            let z_test = reducer.transform(&x_test)?;
            for (target, clf, y) in [
                (Target::Entry, &entry, pick(&entries, &test)),
                (Target::Exit, &exit, pick(&exits, &test)),
            ] {
                self.report(pair, target, &**clf, &z_test, &y)?;
            }
        }

        Ok(Ok(FittedModels {
            scaler,
            reducer,
            entry,
            entry_name,
            exit,
            exit_name,
        }))
    }

    fn report(
        &self,
        pair: &str,
        target: Target,
        clf: &dyn BinaryClassifier,
        x: &Array2<f64>,
        truth: &[f64],
    ) -> Result<()> {
        let predicted = clf.predict(x)?.to_vec();
        let report = ClassificationReport::new(truth, &predicted);
        debug!("{} {} classifier ({}) test results:\n{}", pair, target, clf.kind(), report);
        Ok(())
    }

    /// Neutral zero scores when the record has no usable models.
    fn predict(&self, pair: &str, frame: &FeatureFrame, record: &mut ModelRecord) -> Result<(Vec<f64>, Vec<f64>)> {
        let neutral = || (vec![0.0; frame.len()], vec![0.0; frame.len()]);
        if !record.can_predict() {
            debug!("{}: no models, predictions skipped", pair);
            record.cap_interval(self.config.schedule.skipped_retry_cap);
            return Ok(neutral());
        }
        let (Some(reducer), Some(entry), Some(exit)) =
            (record.reducer(), record.entry_classifier(), record.exit_classifier())
        else {
            return Ok(neutral());
        };

        let scaled = match record.scaler() {
            Some(scaler) if self.config.normalize.reuse_training_scaler => self.normalizer.transform(scaler, frame)?,
            _ => self.normalizer.transform_standalone(frame)?,
        };
        let reduced = reducer.transform(&scaled.to_matrix())?;
        let entry = entry.predict_proba(&reduced)?.to_vec();
        let exit = exit.predict_proba(&reduced)?.to_vec();
        Ok((entry, exit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::DefaultLabelPolicy;
    use crate::ml::macro_f1;
    use crate::ml::reducer::MockReducer;
    use crate::types::candle::fixtures::sine_series;

    const PERIOD: usize = 48;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.normalize.calendar_features = false;
        config
    }

    fn pipeline() -> SignalPipeline {
        SignalPipeline::new(config()).unwrap()
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut config = config();
        config.model.default_classifier = "Perceptron".to_string();
        assert!(matches!(SignalPipeline::new(config), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_first_call_trains_and_predicts() {
        let candles = sine_series(1200, PERIOD as f64, 0.05, 0.001, 7);
        let mut record = ModelRecord::new();
        let frame = pipeline().populate("BTC/USD", &candles, &mut record).unwrap();

        assert_eq!(record.state(), ModelState::Ready, "{:?}", record.last_abort());
        assert_eq!(record.generation(), 1);
        assert!(record.dim() > 1);
        assert_eq!(record.entry_name(), "LDA");
        assert!((2..=32).contains(&record.interval()));

        let entry = frame.column("predict_entry").unwrap();
        let exit = frame.column("predict_exit").unwrap();
        assert_eq!(entry.len(), 1200);
        assert!(entry.iter().chain(exit).all(|p| (0.0..=1.0).contains(p)));
        assert!(!frame.has("%train_entry"));
    }

    #[test]
    fn test_countdown_reuses_models_until_due() {
        let candles = sine_series(1200, PERIOD as f64, 0.05, 0.001, 8);
        let pipeline = pipeline();
        let mut record = ModelRecord::new();
        pipeline.populate("ETH/USD", &candles, &mut record).unwrap();
        assert!(record.can_predict());

        let reducer = Arc::clone(record.reducer().unwrap());
        let entry = Arc::clone(record.entry_classifier().unwrap());
        record.schedule_in(3);

        for _ in 0..2 {
            pipeline.populate("ETH/USD", &candles, &mut record).unwrap();
            assert_eq!(record.generation(), 1);
            assert!(Arc::ptr_eq(record.reducer().unwrap(), &reducer));
            assert!(Arc::ptr_eq(record.entry_classifier().unwrap(), &entry));
        }

        pipeline.populate("ETH/USD", &candles, &mut record).unwrap();
        assert_eq!(record.generation(), 2);
        if let Some(refit) = record.reducer() {
            assert!(!Arc::ptr_eq(refit, &reducer));
        }
        // same algorithm, fresh weights
        if let Some(refit) = record.entry_classifier() {
            assert!(!Arc::ptr_eq(refit, &entry));
            assert_eq!(refit.kind(), entry.kind());
        }
    }

    #[test]
    fn test_collapsed_reducer_skips_instrument() {
        let factory: ReducerFactory = Arc::new(|_: &str| {
            let mut mock = MockReducer::new();
            mock.expect_prefers_clean_data().return_const(false);
            mock.expect_fit().returning(|_| Ok(1));
            mock.expect_dim().return_const(1usize);
            mock.expect_name().return_const("mock");
            Box::new(mock) as Box<dyn Reducer>
        });
        let pipeline = pipeline().with_reducer_factory(factory);
        let candles = sine_series(800, PERIOD as f64, 0.05, 0.001, 9);
        let mut record = ModelRecord::new();
        let frame = pipeline.populate("SOL/USD", &candles, &mut record).unwrap();

        assert_eq!(record.state(), ModelState::Skipped);
        assert_eq!(record.last_abort(), Some(&FitAbort::ReducerCollapsed(1)));
        assert!(record.reducer().is_none());
        assert!(record.interval() <= 4);
        assert!(frame.column("predict_entry").unwrap().iter().all(|p| *p == 0.0));
        assert!(frame.column("predict_exit").unwrap().iter().all(|p| *p == 0.0));
    }

    #[test]
    fn test_failing_reducer_leaves_record_skipped() {
        let candles = sine_series(1200, PERIOD as f64, 0.05, 0.001, 14);
        let mut record = ModelRecord::new();
        pipeline().populate("DOT/USD", &candles, &mut record).unwrap();
        assert!(record.can_predict());

        let factory: ReducerFactory = Arc::new(|_: &str| {
            let mut mock = MockReducer::new();
            mock.expect_prefers_clean_data().return_const(false);
            mock.expect_fit().returning(|_| Err(PipelineError::NotFitted));
            Box::new(mock) as Box<dyn Reducer>
        });
        let failing = pipeline().with_reducer_factory(factory);
        record.schedule_in(1);
        let result = failing.populate("DOT/USD", &candles, &mut record);

        assert!(matches!(result, Err(PipelineError::NotFitted)));
        assert_eq!(record.state(), ModelState::Skipped);
        assert!(!record.can_predict());
        assert_eq!(record.aborts(), 1);
        assert!(matches!(record.last_abort(), Some(FitAbort::Failed(_))));
        assert!(record.interval() <= 4);
        assert_eq!(record.generation(), 2);
    }

    #[test]
    fn test_interval_seed_is_stable() {
        let a = interval_seed(27, "BTC/USD", 1);
        assert_eq!(a, interval_seed(27, "BTC/USD", 1));
        assert_ne!(a, interval_seed(27, "BTC/USD", 2));
        assert_ne!(a, interval_seed(27, "ETH/USD", 1));
        assert_ne!(a, interval_seed(28, "BTC/USD", 1));

        let first = pipeline().next_interval("BTC/USD", 1);
        assert_eq!(first, pipeline().next_interval("BTC/USD", 1));
        assert!((2..=32).contains(&first));
    }

    #[test]
    fn test_missing_labels_abort_the_cycle() {
        let policy = DefaultLabelPolicy {
            oversold_mfi: -1.0,
            overbought_mfi: 101.0,
        };
        let pipeline = pipeline().with_label_policy(Arc::new(policy));
        let candles = sine_series(600, PERIOD as f64, 0.05, 0.001, 10);
        let mut record = ModelRecord::new();
        let frame = pipeline.populate("ADA/USD", &candles, &mut record).unwrap();

        assert_eq!(record.last_abort(), Some(&FitAbort::InsufficientEntries(0)));
        assert_eq!(record.aborts(), 1);
        assert!(frame.column("predict_entry").unwrap().iter().all(|p| *p == 0.0));
    }

    #[test]
    fn test_debug_columns_follow_predictions() {
        let mut config = config();
        config.debug.debug_columns = true;
        config.debug.test_classifier = true;
        let pipeline = SignalPipeline::new(config).unwrap();
        let candles = sine_series(900, PERIOD as f64, 0.05, 0.001, 11);
        let mut record = ModelRecord::new();
        let frame = pipeline.populate("XRP/USD", &candles, &mut record).unwrap();

        assert!(frame.has("%train_entry"));
        assert!(frame.has("%future_gain"));
        let names = frame.column_names();
        let predict_at = names.iter().position(|n| n == "predict_exit").unwrap();
        let debug_at = names.iter().position(|n| n.starts_with('%')).unwrap();
        assert!(predict_at < debug_at);
    }

    #[test]
    fn test_batch_processes_instruments_independently() {
        let pipeline = pipeline();
        let mut cache = ModelCache::new();
        let batch = vec![
            ("BTC/USD".to_string(), sine_series(700, PERIOD as f64, 0.05, 0.001, 12)),
            ("ETH/USD".to_string(), sine_series(700, 36.0, 0.04, 0.001, 13)),
        ];
        let results = pipeline.process_batch(&mut cache, batch).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, frame)| frame.is_ok()));
        assert_eq!(cache.pairs(), vec!["BTC/USD", "ETH/USD"]);
        assert!(cache.get("BTC/USD").unwrap().generation() == 1);

        let dup = vec![
            ("BTC/USD".to_string(), sine_series(100, 48.0, 0.05, 0.001, 1)),
            ("BTC/USD".to_string(), sine_series(100, 48.0, 0.05, 0.001, 2)),
        ];
        assert!(pipeline.process_batch(&mut cache, dup).is_err());
    }

    #[test]
    fn test_sine_predictions_find_troughs_and_peaks() {
        let candles = sine_series(2000, PERIOD as f64, 0.05, 0.001, 42);
        let pipeline = pipeline();
        let mut record = ModelRecord::new();

        pipeline.populate("SINE/USD", &candles.head(1500), &mut record).unwrap();
        assert_eq!(record.state(), ModelState::Ready, "{:?}", record.last_abort());
        assert!(record.interval() >= 2);

        // the second call reuses the models trained on the first 1500 candles
        let frame = pipeline.populate("SINE/USD", &candles, &mut record).unwrap();
        assert_eq!(record.generation(), 1);

        let entry = frame.column("predict_entry").unwrap();
        let exit = frame.column("predict_exit").unwrap();
        let (mut truth, mut predicted) = (Vec::new(), Vec::new());
        let (mut trough_entry, mut peak_entry) = (Vec::new(), Vec::new());
        for i in 1500..2000 {
            let is_trough = i % PERIOD == 3 * PERIOD / 4;
            let is_peak = i % PERIOD == PERIOD / 4;
            if !(is_trough || is_peak) {
                continue;
            }
            truth.push(if is_trough { 1.0 } else { 0.0 });
            predicted.push(if entry[i] > exit[i] { 1.0 } else { 0.0 });
            if is_trough {
                trough_entry.push(entry[i]);
            } else {
                peak_entry.push(entry[i]);
            }
        }

        let f1 = macro_f1(&truth, &predicted);
        assert!(f1 > 0.6, "macro F1 {:.3}", f1);
        let avg = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        assert!(avg(&trough_entry) > avg(&peak_entry));
    }
}
