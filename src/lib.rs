pub mod dispatch;
pub mod error;
pub mod geo;
pub mod highs;
pub mod input;
mod log;
pub mod metrics;
pub mod output;
pub mod scenario;
pub mod solver;
pub mod system;
pub mod utils;
use highs::HighsSolver;
use input::Input;
use std::error::Error;
use std::path::Path;
use std::time::Instant;

pub fn run(input_args: &InputArgs) -> Result<(), Box<dyn Error>> {
    log::show_greeting();

    let begin = Instant::now();
    let path = Path::new(&input_args.path);

    log::input_reading_line(&input_args.path);
    let input = Input::build(path)?;

    let solver = HighsSolver::default();
    let comparison = scenario::run_comparison(
        &input.network,
        &input.loads,
        &input.config,
        &solver,
    )?;
    log::comparison(&comparison);

    log::output_generation_line(&input_args.path);
    output::generate_outputs(&comparison, path)?;

    log::show_farewell(begin.elapsed());

    Ok(())
}

pub struct InputArgs {
    pub path: String,
}

impl InputArgs {
    pub fn build(args: &[String]) -> Result<Self, &'static str> {
        if args.len() < 2 {
            return Err("Not enough arguments [PATH]");
        }

        let path = args[1].clone();

        Ok(Self { path })
    }
}
