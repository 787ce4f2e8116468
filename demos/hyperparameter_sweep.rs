//! Grid search over minibatch size, epochs and hidden size.
//!
//! Usage: cargo run --example hyperparameter_sweep -- [data file] [results.json]
//!
//! The dataset is read once and every configuration is trained from scratch on it.

use lstm_control_chart::data::source::read_lines;
use lstm_control_chart::{run_trial, BestTrial, DataSource, LstmConfig, TrialResult};
use std::env;
use std::fs::File;
use std::io::Write;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let source = args.next().map(|path| DataSource::File(path.into()));
    let output = args.next();

    let lines = read_lines(source.as_ref())?;
    println!("Loaded {} rows\n", lines.len());

    let mut best = BestTrial::new();
    let mut results: Vec<TrialResult> = Vec::new();

    for &batch in &[10, 20, 40] {
        for &epochs in &[10, 28] {
            for &hidden in &[50, 100] {
                let config = LstmConfig {
                    mini_batch_size: batch,
                    num_epochs: epochs,
                    hidden_states_size: hidden,
                    score_every: 0,
                    ..LstmConfig::default()
                };

                let (trial, updated) = run_trial(&config, &lines, best)?;
                best = updated;

                println!(
                    "[e: {} b: {} hs: {}] matches: {}/{} accuracy: {:.4} | current max match: {}",
                    epochs,
                    batch,
                    hidden,
                    trial.match_count,
                    trial.total,
                    trial.accuracy,
                    best.best_match_count()
                );
                results.push(trial);
            }
        }
    }

    if let Some(winner) = best.best() {
        println!(
            "\nBest: e: {} b: {} hs: {} with {} of {} matches ({:.1}%)",
            winner.config.num_epochs,
            winner.config.mini_batch_size,
            winner.config.hidden_states_size,
            winner.match_count,
            winner.total,
            100.0 * winner.match_rate()
        );
    }

    if let Some(path) = output {
        let mut file = File::create(&path)?;
        file.write_all(serde_json::to_string_pretty(&results)?.as_bytes())?;
        println!("results written to {}", path);
    }

    Ok(())
}
