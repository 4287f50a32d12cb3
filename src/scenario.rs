use crate::dispatch::{DispatchModel, DispatchParameters, StepInputs};
use crate::error::Error;
use crate::input::{Config, LoadProfile};
use crate::log;
use crate::metrics::StepMetrics;
use crate::solver::Solver;
use crate::system::{GenerationType, Network};
use rand::prelude::*;
use rand_distr::Bernoulli;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::Deserialize;
use std::fmt;
use std::ops::RangeInclusive;
use tracing::{error, info};

pub const HOURS_PER_DAY: usize = 24;

/// The two configurations compared over the day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Base,
    Battery,
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::Base, Scenario::Battery];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Base => "Base",
            Scenario::Battery => "Battery",
        }
    }

    pub fn battery_enabled(self) -> bool {
        self == Scenario::Battery
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Random wind outages, drawn independently for each step from a
/// seeded stream so that every run sees the same outages
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindOutage {
    pub probability: f64,
    pub seed: u64,
}

/// Everything a scenario run depends on. Built once and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub scenario: Scenario,
    pub num_steps: usize,
    /// First row of the loads table to dispatch
    pub first_step: usize,
    /// Hours in which solar units are available, inclusive on both ends
    pub solar_hours: RangeInclusive<usize>,
    pub wind_outage: Option<WindOutage>,
    /// Solves the steps on the rayon pool
    pub parallel: bool,
    pub dispatch: DispatchParameters,
}

impl ScenarioConfig {
    pub fn hour(&self, step: usize) -> usize {
        (self.first_step + step) % HOURS_PER_DAY
    }

    pub fn solar_availability(&self, hour: usize) -> f64 {
        if self.solar_hours.contains(&hour) {
            1.0
        } else {
            0.0
        }
    }
}

/// Renewable availability factors of each step
#[derive(Debug, Clone, PartialEq)]
pub struct Availability {
    pub solar: Vec<f64>,
    pub wind: Vec<f64>,
}

pub fn availability(config: &ScenarioConfig) -> Result<Availability, Error> {
    let solar = (0..config.num_steps)
        .map(|step| config.solar_availability(config.hour(step)))
        .collect();
    let wind = match &config.wind_outage {
        None => vec![1.0; config.num_steps],
        Some(outage) => {
            let mut rng = Xoshiro256Plus::seed_from_u64(outage.seed);
            let distribution =
                Bernoulli::new(outage.probability).map_err(|e| {
                    Error::configuration(format!("wind outage: {e}"))
                })?;
            distribution
                .sample_iter(&mut rng)
                .take(config.num_steps)
                .map(|out| if out { 0.0 } else { 1.0 })
                .collect()
        }
    };
    Ok(Availability { solar, wind })
}

/// Per-step metrics of one scenario, in step order
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub scenario: Scenario,
    pub steps: Vec<StepMetrics>,
}

impl ScenarioResult {
    /// Coal plus natural gas generation summed over all steps, in MWh
    pub fn daily_fossil_generation(&self) -> f64 {
        self.steps.iter().map(|s| s.fossil_generation()).sum()
    }

    /// Combined fossil generation of each step, for charting
    pub fn fossil_series(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.fossil_generation()).collect()
    }

    pub fn daily_generation_of(&self, kind: GenerationType) -> f64 {
        self.steps.iter().map(|s| s.usage_of(kind)).sum()
    }
}

fn solve_step<S: Solver + ?Sized>(
    network: &Network,
    loads: &LoadProfile,
    config: &ScenarioConfig,
    availability: &Availability,
    solver: &S,
    step: usize,
) -> Result<StepMetrics, Error> {
    let row = config.first_step + step;
    let step_loads = loads.loads_for(network, row)?;
    let load_step = &loads.steps[row];
    let inputs = StepInputs {
        scenario: config.scenario.name(),
        step,
        hour: config.hour(step),
        loads: &step_loads,
        solar: availability.solar[step],
        wind: availability.wind[step],
        battery_active: config.scenario.battery_enabled(),
    };
    let model = DispatchModel::new(network, &config.dispatch, &inputs)?;
    let solution = model.solve(solver).inspect_err(|e| {
        error!(scenario = inputs.scenario, step, "{e}");
    })?;
    Ok(StepMetrics::aggregate(
        network,
        &model,
        &solution,
        load_step.time,
        load_step.net,
    ))
}

/// Dispatches every step of a scenario. The first step without an
/// optimal dispatch aborts the whole scenario.
pub fn run_scenario<S: Solver + ?Sized>(
    network: &Network,
    loads: &LoadProfile,
    config: &ScenarioConfig,
    solver: &S,
) -> Result<ScenarioResult, Error> {
    let last_row = config.first_step + config.num_steps;
    if last_row > loads.steps.len() {
        return Err(Error::configuration(format!(
            "{} steps from row {} requested, loads table has {} rows",
            config.num_steps,
            config.first_step,
            loads.steps.len()
        )));
    }
    loads.validate(network)?;
    let availability = availability(config)?;

    info!(
        scenario = config.scenario.name(),
        steps = config.num_steps,
        parallel = config.parallel,
        "running scenario"
    );

    let solve = |step| {
        solve_step(network, loads, config, &availability, solver, step)
    };
    let steps: Vec<StepMetrics> = if config.parallel {
        (0..config.num_steps)
            .into_par_iter()
            .map(solve)
            .collect::<Result<_, _>>()?
    } else {
        (0..config.num_steps).map(solve).collect::<Result<_, _>>()?
    };

    Ok(ScenarioResult {
        scenario: config.scenario,
        steps,
    })
}

/// Daily results with and without batteries
#[derive(Debug, Clone, PartialEq)]
pub struct DailyComparison {
    pub base: ScenarioResult,
    pub battery: ScenarioResult,
}

impl DailyComparison {
    /// Fossil generation avoided by the batteries over the day, in MWh
    pub fn fossil_savings(&self) -> f64 {
        self.base.daily_fossil_generation()
            - self.battery.daily_fossil_generation()
    }
}

/// Runs both scenarios, printing each one as it completes
pub fn run_comparison<S: Solver + ?Sized>(
    network: &Network,
    loads: &LoadProfile,
    config: &Config,
    solver: &S,
) -> Result<DailyComparison, Error> {
    let mut results = Vec::with_capacity(Scenario::ALL.len());
    for scenario in Scenario::ALL {
        let scenario_config = config.build_scenario_config(scenario);
        let result = run_scenario(network, loads, &scenario_config, solver)?;
        log::scenario_table(&result);
        log::generation_mix(&result);
        log::daily_total(&result);
        results.push(result);
    }
    let battery = results.pop();
    let base = results.pop();
    match (base, battery) {
        (Some(base), Some(battery)) => Ok(DailyComparison { base, battery }),
        _ => Err(Error::configuration("both scenarios must run")),
    }
}
