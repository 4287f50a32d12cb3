use crate::error::Error;
use crate::metrics::StepMetrics;
use crate::scenario::{DailyComparison, ScenarioResult};
use crate::system::GenerationType;
use crate::utils;

use csv::Writer;
use serde;
use std::io;
use std::path::Path;

#[derive(serde::Serialize)]
struct StepOutput {
    step: usize,
    hour: usize,
    time: f64,
    timestamp: Option<String>,
    coal: f64,
    natural_gas: f64,
    nuclear: f64,
    hydro: f64,
    wind: f64,
    solar: f64,
    coal_limit: f64,
    natural_gas_limit: f64,
    nuclear_limit: f64,
    hydro_limit: f64,
    wind_limit: f64,
    solar_limit: f64,
    fossil: f64,
    total_generated: f64,
    total_consumed: f64,
    power_distance: f64,
    objective: f64,
    efficiency: Option<f64>,
    average_distance: Option<f64>,
    peak_load_node: Option<usize>,
}

impl From<&StepMetrics> for StepOutput {
    fn from(s: &StepMetrics) -> Self {
        let usage = |kind: GenerationType| s.usage_of(kind);
        let limit = |kind: GenerationType| s.limit_of(kind);
        Self {
            step: s.step,
            hour: s.hour,
            time: s.time,
            timestamp: utils::serial_to_datetime(s.time)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            coal: usage(GenerationType::Coal),
            natural_gas: usage(GenerationType::NaturalGas),
            nuclear: usage(GenerationType::Nuclear),
            hydro: usage(GenerationType::Hydro),
            wind: usage(GenerationType::Wind),
            solar: usage(GenerationType::Solar),
            coal_limit: limit(GenerationType::Coal),
            natural_gas_limit: limit(GenerationType::NaturalGas),
            nuclear_limit: limit(GenerationType::Nuclear),
            hydro_limit: limit(GenerationType::Hydro),
            wind_limit: limit(GenerationType::Wind),
            solar_limit: limit(GenerationType::Solar),
            fossil: s.fossil_generation(),
            total_generated: s.total_generated,
            total_consumed: s.total_consumed,
            power_distance: s.power_distance,
            objective: s.objective,
            efficiency: s.efficiency(),
            average_distance: s.average_distance(),
            peak_load_node: s.peak_load_node,
        }
    }
}

fn write_step_metrics<W: io::Write>(
    result: &ScenarioResult,
    wtr: &mut Writer<W>,
) -> Result<(), Error> {
    for s in result.steps.iter() {
        wtr.serialize(StepOutput::from(s))?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(serde::Serialize)]
struct SummaryOutput {
    scenario: String,
    fossil_generation: f64,
    coal: f64,
    natural_gas: f64,
    nuclear: f64,
    hydro: f64,
    wind: f64,
    solar: f64,
}

fn write_summary<W: io::Write>(
    comparison: &DailyComparison,
    wtr: &mut Writer<W>,
) -> Result<(), Error> {
    for result in [&comparison.base, &comparison.battery] {
        let daily = |kind: GenerationType| result.daily_generation_of(kind);
        wtr.serialize(SummaryOutput {
            scenario: result.scenario.to_string(),
            fossil_generation: result.daily_fossil_generation(),
            coal: daily(GenerationType::Coal),
            natural_gas: daily(GenerationType::NaturalGas),
            nuclear: daily(GenerationType::Nuclear),
            hydro: daily(GenerationType::Hydro),
            wind: daily(GenerationType::Wind),
            solar: daily(GenerationType::Solar),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn generate_outputs(
    comparison: &DailyComparison,
    path: &Path,
) -> Result<(), Error> {
    for result in [&comparison.base, &comparison.battery] {
        let filename = format!(
            "metrics_{}.csv",
            result.scenario.name().to_lowercase()
        );
        let mut wtr = Writer::from_path(path.join(filename))?;
        write_step_metrics(result, &mut wtr)?;
    }
    let mut wtr = Writer::from_path(path.join("summary.csv"))?;
    write_summary(comparison, &mut wtr)?;
    Ok(())
}
