use crate::metrics::StepMetrics;
use crate::scenario::{DailyComparison, ScenarioResult};
use crate::system::GenerationType;
use std::time::Duration;

pub fn show_greeting() {
    println!("\n# texpow - loss-aware hourly dispatch");
}

pub fn input_reading_line(path: &str) {
    println!("\nReading input files from '{path}'");
}

pub fn output_generation_line(path: &str) {
    println!("\nWriting outputs to '{path}'");
}

/// Helper function for displaying the greeting data for a scenario
pub fn scenario_greeting(result: &ScenarioResult) {
    println!("\n# Scenario: {}", result.scenario);
    println!("- Steps: {}\n", result.steps.len());
}

/// Helper function for displaying the dispatch table header
pub fn dispatch_table_header() {
    println!(
        "{0: ^6} | {1: ^5} | {2: ^10} | {3: ^10} | {4: ^10} | {5: ^10} | {6: ^10} | {7: ^10}",
        "step", "hour", "solar", "wind", "fossil", "total", "consumed", "objective"
    )
}

/// Helper function for displaying a divider for the dispatch table
pub fn dispatch_table_divider() {
    println!("------------------------------------------------------------------------------------------")
}

/// Helper function for displaying a row of step results for
/// the dispatch table
pub fn dispatch_table_row(metrics: &StepMetrics) {
    println!(
        "{0: >6} | {1: >5} | {2: >10.2} | {3: >10.2} | {4: >10.2} | {5: >10.2} | {6: >10.2} | {7: >10.2}",
        metrics.step,
        metrics.hour,
        metrics.usage_of(GenerationType::Solar),
        metrics.usage_of(GenerationType::Wind),
        metrics.fossil_generation(),
        metrics.total_generated,
        metrics.total_consumed,
        metrics.objective
    )
}

pub fn scenario_table(result: &ScenarioResult) {
    scenario_greeting(result);
    dispatch_table_header();
    dispatch_table_divider();
    for metrics in result.steps.iter() {
        dispatch_table_row(metrics);
    }
}

/// Daily energy and mean utilisation of every source that ran
pub fn generation_mix(result: &ScenarioResult) {
    let steps = result.steps.len().max(1) as f64;
    println!();
    for kind in GenerationType::ALL {
        let energy = result.daily_generation_of(kind);
        if energy <= 0.0 {
            continue;
        }
        let utilisation: f64 =
            result.steps.iter().map(|s| s.utilisation(kind)).sum::<f64>()
                / steps;
        println!(
            "- {}: {:.2} MWh ({:.1}% utilisation)",
            kind,
            energy,
            100.0 * utilisation
        );
    }
}

pub fn daily_total(result: &ScenarioResult) {
    println!(
        "\n{}: {:.2} MWh",
        result.scenario,
        result.daily_fossil_generation()
    );
}

pub fn comparison(comparison: &DailyComparison) {
    println!(
        "\nFossil generation avoided by batteries: {:.2} MWh",
        comparison.fossil_savings()
    );
}

pub fn show_farewell(time: Duration) {
    println!("\nTotal time: {:.2} s", time.as_millis() as f64 / 1000.0)
}
