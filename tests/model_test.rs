use lstm_control_chart::{
    run_trial, AlignmentMode, BestTrial, CollectionParser, Error, GradientNormalization, LSTMClassifier, LstmConfig,
    ModelState, SequenceDataSetIterator, SequenceModel, SequenceTensor, SplitPolicy, UciSequenceParser, Updater,
};
use ndarray::Array3;

/// Two classes of 8-step charts: rising rows first, then falling rows
fn trend_rows(per_class: usize) -> Vec<String> {
    let mut rows = Vec::new();
    for direction in [1.0, -1.0] {
        for i in 0..per_class {
            let offset = 30.0 + (i % 5) as f64;
            let row: Vec<String> = (0..8)
                .map(|t| format!("{:.3}", offset + direction * t as f64 * (1.0 + 0.1 * i as f64)))
                .collect();
            rows.push(row.join(" "));
        }
    }
    rows
}

fn trend_config() -> LstmConfig {
    LstmConfig::new(5, 2, 12, 6)
        .with_group_size(10)
        .with_learning_rate(0.05)
        .with_score_every(0)
        .with_split(SplitPolicy::Holdout { test_fraction: 0.2 })
}

#[test]
fn test_operations_before_training_are_rejected() {
    let config = trend_config();
    let mut data = UciSequenceParser::new(&config).parse_lines(&trend_rows(10)).unwrap();
    let mut model = SequenceModel::new(config).unwrap();

    // no network yet
    assert!(matches!(model.train(&mut data.train, &mut data.test), Err(Error::Validation(_))));
    assert!(matches!(model.evaluate(&mut data.test), Err(Error::Validation(_))));
    assert!(matches!(model.forecast("1 2 3"), Err(Error::Validation(_))));
    assert_eq!(model.state(), ModelState::Constructed);
    assert!(!data.train.has_pre_processor());
}

#[test]
fn test_train_evaluate_forecast() {
    let config = trend_config();
    let mut data = UciSequenceParser::new(&config).parse_lines(&trend_rows(10)).unwrap();
    let mut model = SequenceModel::new(config).unwrap();

    model.configure().unwrap();
    model.train(&mut data.train, &mut data.test).unwrap();
    assert_eq!(model.state(), ModelState::Trained);
    assert!(data.train.has_pre_processor());
    assert!(data.test.has_pre_processor());

    let history = model.metrics_history();
    assert_eq!(history.len(), 12);
    assert!(history.iter().all(|m| m.test_accuracy.is_some()));
    assert!(history[11].train_score < history[0].train_score);

    let evaluation = model.evaluate(&mut data.test).unwrap();
    assert_eq!(model.state(), ModelState::Evaluated);
    assert_eq!(evaluation.total(), 4);

    let forecast = model.forecast(&data.test_pairs[0].features).unwrap();
    assert_eq!(forecast.probabilities().shape(), &[2, 8]);
    for t in 0..8 {
        assert!((forecast.probabilities().column(t).sum() - 1.0).abs() < 1e-9);
    }
    assert!((forecast.class_sums().iter().sum::<f64>() - 8.0).abs() < 1e-9);
    assert!(forecast.predicted_class() < 2);

    // forecasts of other lengths are allowed
    assert_eq!(model.forecast("30 31 32").unwrap().num_timesteps(), 3);
}

#[test]
fn test_forecast_input_validation() {
    let config = trend_config().with_gradient_normalization(GradientNormalization::ClipL2PerParamType(1.0));
    let config = LstmConfig { num_epochs: 1, ..config };
    let mut data = UciSequenceParser::new(&config).parse_lines(&trend_rows(10)).unwrap();
    let mut model = SequenceModel::new(config).unwrap();
    model.configure().unwrap();
    model.train(&mut data.train, &mut data.test).unwrap();

    assert!(matches!(model.forecast("   "), Err(Error::Validation(_))));
    assert!(matches!(model.forecast(""), Err(Error::Validation(_))));
    assert!(matches!(model.forecast("30 abc 31"), Err(Error::Parse { .. })));

    // a trained model cannot be trained again
    assert!(matches!(model.train(&mut data.train, &mut data.test), Err(Error::Validation(_))));
}

#[test]
fn test_training_is_reproducible() {
    let run = || {
        let config = LstmConfig { num_epochs: 2, ..trend_config() };
        let mut data = UciSequenceParser::new(&config).parse_lines(&trend_rows(10)).unwrap();
        let mut model = SequenceModel::new(config).unwrap();
        model.configure().unwrap();
        model.train(&mut data.train, &mut data.test).unwrap();
        model.forecast(&data.test_pairs[1].features).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_sweep_threads_best_trial() {
    let rows = trend_rows(10);
    let mut best = BestTrial::new();
    for hidden in [3, 5] {
        let config = LstmConfig {
            hidden_states_size: hidden,
            num_epochs: 2,
            ..trend_config()
        };
        let (trial, updated) = run_trial(&config, &rows, best).unwrap();
        assert_eq!(trial.total, 4);
        assert_eq!(trial.predictions.len(), 4);
        assert!(trial.match_count <= trial.total);
        best = updated;
    }
    assert!(best.best().is_some());
}

#[test]
fn test_failed_training_reinitializes_network() {
    let config = LstmConfig { num_epochs: 3, ..trend_config() };
    let mut data = UciSequenceParser::new(&config).parse_lines(&trend_rows(10)).unwrap();
    let mut model = SequenceModel::new(config.clone()).unwrap();
    model.configure().unwrap();

    // the epoch-end evaluation fails after the first epoch has updated the weights
    let rows: Vec<String> = trend_rows(2);
    let features = SequenceTensor::tensorize(&rows).unwrap();
    let labels = SequenceTensor::from_labels(&[0, 0, 1, 1]);
    let mut mismatched = SequenceDataSetIterator::new(features, labels, 2, 3, AlignmentMode::AlignEnd).unwrap();
    assert!(matches!(model.train(&mut data.train, &mut mismatched), Err(Error::Validation(_))));

    assert_eq!(model.state(), ModelState::Configured);
    assert!(model.metrics_history().is_empty());
    let fresh = LSTMClassifier::new(1, config.hidden_states_size, config.num_label_classes, config.seed);
    let input = Array3::from_shape_fn((1, 1, 8), |(_, _, t)| t as f64 * 0.1);
    let restored = model.classifier().unwrap().output(&input, None);
    assert!((restored - fresh.output(&input, None)).iter().all(|d| d.abs() < 1e-12));

    // a later run starts from the seeded weights and succeeds
    model.train(&mut data.train, &mut data.test).unwrap();
    assert_eq!(model.state(), ModelState::Trained);
}

#[test]
fn test_configured_updater_drives_training() {
    for updater in [Updater::Sgd, Updater::Adam] {
        let config = LstmConfig { num_epochs: 8, ..trend_config() }.with_updater(updater);
        let mut data = UciSequenceParser::new(&config).parse_lines(&trend_rows(10)).unwrap();
        let mut model = SequenceModel::new(config).unwrap();
        model.configure().unwrap();
        model.train(&mut data.train, &mut data.test).unwrap();

        let history = model.metrics_history();
        assert_eq!(history.len(), 8);
        assert!(history.iter().all(|m| m.train_score.is_finite()));
    }

    let run = |updater| {
        let config = LstmConfig { num_epochs: 2, ..trend_config() }.with_updater(updater);
        let mut data = UciSequenceParser::new(&config).parse_lines(&trend_rows(10)).unwrap();
        let mut model = SequenceModel::new(config).unwrap();
        model.configure().unwrap();
        model.train(&mut data.train, &mut data.test).unwrap();
        model.forecast(&data.test_pairs[0].features).unwrap()
    };
    assert_ne!(run(Updater::Sgd), run(Updater::Nadam));
}
