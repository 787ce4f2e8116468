//! Train, evaluate and forecast on the UCI synthetic control chart dataset.
//!
//! Usage: cargo run --example synthetic_control -- [data file or URL] [config.json] [model.json|model.bin]
//!
//! Without a data argument the dataset is downloaded from the UCI archive.

use lstm_control_chart::{CollectionParser, DataSource, LstmConfig, SequenceModel, UciSequenceParser, CONTROL_CHART_LABELS};
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let source = args.next().map(|arg| {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            DataSource::Url(arg)
        } else {
            DataSource::File(arg.into())
        }
    });
    let config = match args.next() {
        Some(path) => LstmConfig::from_json_file(path)?,
        None => LstmConfig::default(),
    };
    let model_path = args.next();

    println!("LSTM control chart classifier");
    println!("=============================");
    println!(
        "batch {}, epochs {}, hidden {}, learning rate {}, split {:?}\n",
        config.mini_batch_size, config.num_epochs, config.hidden_states_size, config.learning_rate, config.split
    );

    let mut data = UciSequenceParser::new(&config).parse(source.as_ref())?;
    let num_classes = config.num_label_classes;
    let (epochs, batch, hidden) = (config.num_epochs, config.mini_batch_size, config.hidden_states_size);

    let mut model = SequenceModel::new(config)?;
    model.configure()?;
    model.train(&mut data.train, &mut data.test)?;

    let evaluation = model.evaluate(&mut data.test)?;
    println!("{}", evaluation);

    let mut match_count = 0;
    let mut sums_total = vec![0.0; num_classes];
    for pair in &data.test_pairs {
        let forecast = model.forecast(&pair.features)?;
        let sums = forecast.class_sums();
        for (total, sum) in sums_total.iter_mut().zip(sums.iter()) {
            *total += sum;
        }
        let formatted: Vec<String> = sums.iter().map(|s| format!("{:.4}", s)).collect();
        println!("l: {} sums: [{}]", pair.label, formatted.join(", "));
        if forecast.predicted_class() == pair.label {
            match_count += 1;
        }
    }

    println!(
        "[e: {} b: {} hs: {}] matches: {} of {} Sums total {:?}",
        epochs,
        batch,
        hidden,
        match_count,
        data.test_pairs.len(),
        sums_total.iter().map(|s| s.round() as i64).collect::<Vec<_>>()
    );

    if let Some(first) = data.test_pairs.first() {
        let predicted = model.forecast(&first.features)?.predicted_class();
        let name = CONTROL_CHART_LABELS.get(predicted).copied().unwrap_or("?");
        println!("first held-out chart looks like: {}", name);
    }

    if let Some(path) = model_path {
        model.save(&path)?;
        println!("model saved to {}", path);
    }

    Ok(())
}
