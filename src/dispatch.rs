use crate::error::Error;
use crate::solver::{self, Problem, Sense, Solver};
use crate::system::{GenerationType, Network};
use tracing::debug;

/// Largest relative mismatch accepted on a node balance
const BALANCE_TOLERANCE: f64 = 1e-6;

/// Fraction of the power sent through a link that reaches its other end
pub fn delivery_factor(loss_rate: f64, distance: f64) -> f64 {
    1.0 - loss_rate * distance
}

/// Generation bound after scaling renewables by their availability
pub fn effective_limit(
    kind: GenerationType,
    limit: f64,
    solar: f64,
    wind: f64,
) -> f64 {
    match kind {
        GenerationType::Solar => limit * solar,
        GenerationType::Wind => limit * wind,
        _ => limit,
    }
}

/// Fixed diurnal battery behaviour, with no state of charge carried
/// between hours. Charging and discharging never overlap.
#[derive(Debug, Clone, PartialEq)]
pub struct BatterySchedule {
    /// Energy capacity, in MWh
    pub capacity: f64,
    /// Charges on every hour strictly before this one
    pub charge_before_hour: usize,
    /// Charges on every hour strictly after this one
    pub charge_after_hour: usize,
}

impl Default for BatterySchedule {
    fn default() -> Self {
        Self {
            capacity: 750.0,
            charge_before_hour: 7,
            charge_after_hour: 22,
        }
    }
}

impl BatterySchedule {
    pub fn is_charging(&self, hour: usize) -> bool {
        hour < self.charge_before_hour || hour > self.charge_after_hour
    }

    /// Power injected at a battery node on `hour`: capacity/16 while
    /// discharging, -capacity/8 while charging.
    pub fn term(&self, hour: usize) -> f64 {
        if self.is_charging(hour) {
            -(self.capacity / 8.0)
        } else {
            self.capacity / 16.0
        }
    }
}

/// Parameters shared by every step of a scenario
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchParameters {
    /// Fractional loss per mile of transmission
    pub loss_rate: f64,
    /// Identifiers of the battery-equipped nodes
    pub battery_nodes: Vec<usize>,
    pub battery: BatterySchedule,
}

impl Default for DispatchParameters {
    fn default() -> Self {
        Self {
            loss_rate: 0.0005,
            battery_nodes: vec![],
            battery: BatterySchedule::default(),
        }
    }
}

/// Data that changes from one time step to the next
#[derive(Debug, Clone)]
pub struct StepInputs<'a> {
    /// Scenario label, used when reporting failures
    pub scenario: &'a str,
    pub step: usize,
    /// Time-of-day bucket, 0 to 23
    pub hour: usize,
    /// Demand of each node, in the order of [`Network::nodes`]
    pub loads: &'a [f64],
    pub solar: f64,
    pub wind: f64,
    pub battery_active: bool,
}

/// A generation variable and the bound it was created with
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorColumn {
    pub node: usize,
    pub kind: GenerationType,
    pub limit: f64,
    pub column: usize,
}

/// Helper accessor for indexing desired variables and constraints
/// in each dispatch model
#[derive(Debug, Clone, PartialEq)]
pub struct Accessors {
    pub generation: Vec<GeneratorColumn>,
    pub direct_flow: Vec<usize>,
    pub reverse_flow: Vec<usize>,
    pub balance: Vec<usize>,
}

/// The linear program of a single time step. Built from scratch for each
/// step and dropped once its metrics are extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchModel {
    pub problem: Problem,
    pub accessors: Accessors,
    /// Battery injection added to each node balance
    pub battery_terms: Vec<f64>,
    /// Distance of each link, in the order of [`Network::links`]
    pub distances: Vec<f64>,
    pub scenario: String,
    pub step: usize,
    pub hour: usize,
}

impl DispatchModel {
    pub fn new(
        network: &Network,
        params: &DispatchParameters,
        inputs: &StepInputs,
    ) -> Result<Self, Error> {
        if inputs.loads.len() != network.meta.nodes_count {
            return Err(Error::configuration(format!(
                "{} loads given for {} nodes",
                inputs.loads.len(),
                network.meta.nodes_count
            )));
        }

        let mut battery_terms = vec![0.0; network.meta.nodes_count];
        for id in params.battery_nodes.iter() {
            let index = network.index_of(*id).ok_or_else(|| {
                Error::configuration(format!(
                    "battery node {id} is not in the network"
                ))
            })?;
            if inputs.battery_active {
                battery_terms[index] = params.battery.term(inputs.hour);
            }
        }

        let mut pb = Problem::new();

        // VARIABLES
        let generation: Vec<GeneratorColumn> = network
            .generators()
            .map(|(node, n, kind)| {
                let limit =
                    effective_limit(kind, n.limit, inputs.solar, inputs.wind);
                let cost = if kind.is_fossil() { 1.0 } else { 0.0 };
                GeneratorColumn {
                    node,
                    kind,
                    limit,
                    column: pb.add_column(cost, 0.0..limit),
                }
            })
            .collect();
        let direct_flow: Vec<usize> = network
            .links()
            .iter()
            .map(|link| pb.add_column(0.0, 0.0..link.capacity))
            .collect();
        let reverse_flow: Vec<usize> = network
            .links()
            .iter()
            .map(|link| pb.add_column(0.0, 0.0..link.capacity))
            .collect();

        let mut factors: Vec<f64> = Vec::with_capacity(network.links().len());
        for link in network.links().iter() {
            let factor = delivery_factor(params.loss_rate, link.distance);
            if factor <= 0.0 {
                return Err(Error::configuration(format!(
                    "link {} - {} loses all transmitted power ({:.1} mi)",
                    network.nodes()[link.source].id,
                    network.nodes()[link.target].id,
                    link.distance
                )));
            }
            factors.push(factor);
        }

        // Adds one balance per node with load minus battery as RHS
        let mut generation_at: Vec<Vec<usize>> =
            vec![vec![]; network.meta.nodes_count];
        for g in generation.iter() {
            generation_at[g.node].push(g.column);
        }
        let mut balance: Vec<usize> = vec![0; network.meta.nodes_count];
        for (index, node) in network.nodes().iter().enumerate() {
            let mut row: Vec<(usize, f64)> =
                generation_at[index].iter().map(|col| (*col, 1.0)).collect();
            for link_id in node.source_link_ids.iter() {
                row.push((direct_flow[*link_id], -1.0));
                row.push((reverse_flow[*link_id], factors[*link_id]));
            }
            for link_id in node.target_link_ids.iter() {
                row.push((direct_flow[*link_id], factors[*link_id]));
                row.push((reverse_flow[*link_id], -1.0));
            }
            let rhs = inputs.loads[index] - battery_terms[index];
            balance[index] = pb.add_row(rhs..rhs, &row);
        }

        debug!(
            scenario = inputs.scenario,
            step = inputs.step,
            columns = pb.num_col,
            rows = pb.num_row,
            nonzeros = pb.num_nz,
            "built dispatch model"
        );

        Ok(Self {
            problem: pb,
            accessors: Accessors {
                generation,
                direct_flow,
                reverse_flow,
                balance,
            },
            battery_terms,
            distances: network.links().iter().map(|l| l.distance).collect(),
            scenario: inputs.scenario.to_string(),
            step: inputs.step,
            hour: inputs.hour,
        })
    }

    /// Solves the model, failing with [`Error::Infeasible`] unless an
    /// optimal dispatch that meets every node balance is found.
    pub fn solve<S: Solver + ?Sized>(
        &self,
        solver: &S,
    ) -> Result<StepSolution, Error> {
        let solution = solver.solve(&self.problem, Sense::Minimise)?;
        if !solution.is_optimal() {
            return Err(Error::Infeasible {
                scenario: self.scenario.clone(),
                step: self.step,
                status: solution.status.to_string(),
            });
        }
        if solution.colvalue.len() != self.problem.num_col {
            return Err(Error::Solver(format!(
                "expected {} column values, got {}",
                self.problem.num_col,
                solution.colvalue.len()
            )));
        }
        let activities = self.problem.row_activities(&solution.colvalue);
        let unbalanced = self.accessors.balance.iter().any(|row| {
            let rhs = self.problem.row_lower[*row];
            let tolerance = BALANCE_TOLERANCE * rhs.abs().max(1.0);
            (activities[*row] - rhs).abs() > tolerance
        });
        if unbalanced {
            return Err(Error::Infeasible {
                scenario: self.scenario.clone(),
                step: self.step,
                status: String::from("Unbalanced"),
            });
        }
        Ok(StepSolution::new(self, solution))
    }

    /// Net injection left at each node by `solution`: generation plus
    /// delivered inflow minus outflow, load and battery charging.
    pub fn balance_residuals(&self, solution: &StepSolution) -> Vec<f64> {
        let activities = self.problem.row_activities(&solution.colvalue);
        self.accessors
            .balance
            .iter()
            .map(|row| activities[*row] - self.problem.row_lower[*row])
            .collect()
    }

    /// Demand of each node that was subtracted from its balance
    pub fn loads(&self) -> Vec<f64> {
        self.accessors
            .balance
            .iter()
            .enumerate()
            .map(|(index, row)| {
                self.problem.row_lower[*row] + self.battery_terms[index]
            })
            .collect()
    }
}

/// Solved values of one step, split by variable group
#[derive(Debug, Clone, PartialEq)]
pub struct StepSolution {
    pub generation: Vec<f64>,
    pub direct_flow: Vec<f64>,
    pub reverse_flow: Vec<f64>,
    pub objective: f64,
    pub colvalue: Vec<f64>,
}

impl StepSolution {
    fn new(model: &DispatchModel, solution: solver::Solution) -> Self {
        let pick = |cols: &mut dyn Iterator<Item = usize>| -> Vec<f64> {
            cols.map(|c| solution.colvalue[c]).collect()
        };
        let generation =
            pick(&mut model.accessors.generation.iter().map(|g| g.column));
        let direct_flow = pick(&mut model.accessors.direct_flow.iter().copied());
        let reverse_flow =
            pick(&mut model.accessors.reverse_flow.iter().copied());
        Self {
            generation,
            direct_flow,
            reverse_flow,
            objective: solution.objective,
            colvalue: solution.colvalue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Coordinates, EARTH_RADIUS_MILES};
    use crate::highs::HighsSolver;
    use crate::system::{Node, RawLink};

    const TOL: f64 = 1e-6;

    /// Latitude offset, in degrees, that puts two nodes `miles` apart
    fn latitude_for(miles: f64) -> f64 {
        (miles / EARTH_RADIUS_MILES).to_degrees()
    }

    fn two_node_network(kind: GenerationType) -> Network {
        let nodes = vec![
            Node::new(1, Some(kind), 100.0, Coordinates::new(0.0, 0.0)),
            Node::new(2, None, 0.0, Coordinates::new(latitude_for(10.0), 0.0)),
        ];
        let links = [RawLink { node1: 1, node2: 2, limit: 50.0 }];
        Network::new(nodes, &links).unwrap()
    }

    fn radial_network() -> Network {
        let nodes = vec![
            Node::new(
                1,
                Some(GenerationType::Coal),
                80.0,
                Coordinates::new(0.0, 0.0),
            ),
            Node::new(
                2,
                Some(GenerationType::Wind),
                30.0,
                Coordinates::new(latitude_for(40.0), 0.0),
            ),
            Node::new(3, None, 0.0, Coordinates::new(latitude_for(20.0), 0.0)),
            Node::new(
                4,
                Some(GenerationType::Nuclear),
                20.0,
                Coordinates::new(latitude_for(25.0), 0.0),
            ),
        ];
        let links = [
            RawLink { node1: 1, node2: 3, limit: 100.0 },
            RawLink { node1: 2, node2: 3, limit: 100.0 },
            RawLink { node1: 3, node2: 4, limit: 100.0 },
        ];
        Network::new(nodes, &links).unwrap()
    }

    fn inputs<'a>(loads: &'a [f64], hour: usize) -> StepInputs<'a> {
        StepInputs {
            scenario: "Base",
            step: hour,
            hour,
            loads,
            solar: if (6..=18).contains(&hour) { 1.0 } else { 0.0 },
            wind: 1.0,
            battery_active: false,
        }
    }

    #[test]
    fn test_delivery_factor_decreases_with_distance() {
        let near = delivery_factor(0.0005, 10.0);
        let far = delivery_factor(0.0005, 120.0);
        assert!((near - 0.995).abs() < 1e-12);
        assert!(far < near);
    }

    #[test]
    fn test_effective_limit_scales_renewables_only() {
        assert_eq!(effective_limit(GenerationType::Solar, 50.0, 0.0, 1.0), 0.0);
        assert_eq!(effective_limit(GenerationType::Solar, 50.0, 1.0, 0.0), 50.0);
        assert_eq!(effective_limit(GenerationType::Wind, 50.0, 1.0, 0.0), 0.0);
        assert_eq!(effective_limit(GenerationType::Wind, 50.0, 0.0, 1.0), 50.0);
        assert_eq!(effective_limit(GenerationType::Coal, 50.0, 0.0, 0.0), 50.0);
    }

    #[test]
    fn test_battery_term_by_hour() {
        let schedule = BatterySchedule::default();
        for hour in 0..24 {
            let term = schedule.term(hour);
            if (7..=22).contains(&hour) {
                assert_eq!(term, 750.0 / 16.0, "hour {hour}");
            } else {
                assert_eq!(term, -750.0 / 8.0, "hour {hour}");
            }
        }
    }

    #[test]
    fn test_create_model_structure() {
        let network = radial_network();
        let loads = [0.0, 0.0, 50.0, 0.0];
        let model = DispatchModel::new(
            &network,
            &DispatchParameters::default(),
            &inputs(&loads, 12),
        )
        .unwrap();
        assert_eq!(model.accessors.generation.len(), 3);
        assert_eq!(model.accessors.direct_flow.len(), 3);
        assert_eq!(model.accessors.reverse_flow.len(), 3);
        assert_eq!(model.accessors.balance.len(), 4);
        assert_eq!(model.problem.num_col, 9);
        assert_eq!(model.problem.num_row, 4);
        // only the coal unit is priced
        let costs: Vec<f64> = model
            .accessors
            .generation
            .iter()
            .map(|g| model.problem.col_cost[g.column])
            .collect();
        assert_eq!(costs, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_two_node_gas_dispatch() {
        let network = two_node_network(GenerationType::NaturalGas);
        let loads = [0.0, 40.0];
        let model = DispatchModel::new(
            &network,
            &DispatchParameters::default(),
            &inputs(&loads, 0),
        )
        .unwrap();
        let solution = model.solve(&HighsSolver::default()).unwrap();
        let expected = 40.0 / 0.995;
        assert!((solution.direct_flow[0] - expected).abs() < TOL);
        assert!(solution.reverse_flow[0].abs() < TOL);
        assert!((solution.generation[0] - expected).abs() < TOL);
        assert!((solution.objective - expected).abs() < TOL);
    }

    #[test]
    fn test_solar_only_network_is_infeasible_at_night() {
        let network = two_node_network(GenerationType::Solar);
        let loads = [0.0, 40.0];
        let model = DispatchModel::new(
            &network,
            &DispatchParameters::default(),
            &inputs(&loads, 0),
        )
        .unwrap();
        let solar = model.accessors.generation[0].column;
        assert_eq!(model.problem.col_upper[solar], 0.0);
        let r = model.solve(&HighsSolver::default());
        assert!(matches!(r, Err(Error::Infeasible { step: 0, .. })));
    }

    #[test]
    fn test_solar_network_is_free_at_noon() {
        let network = two_node_network(GenerationType::Solar);
        let loads = [0.0, 40.0];
        let model = DispatchModel::new(
            &network,
            &DispatchParameters::default(),
            &inputs(&loads, 12),
        )
        .unwrap();
        let solution = model.solve(&HighsSolver::default()).unwrap();
        assert!(solution.objective.abs() < TOL);
        assert!(solution.generation[0] >= 40.0 / 0.995 - TOL);
    }

    #[test]
    fn test_balances_and_bounds_hold_with_batteries() {
        let network = radial_network();
        let params = DispatchParameters {
            battery_nodes: vec![3],
            battery: BatterySchedule {
                capacity: 160.0,
                ..BatterySchedule::default()
            },
            ..DispatchParameters::default()
        };
        let solver = HighsSolver::default();
        for hour in [3, 12] {
            let loads = [5.0, 0.0, 60.0, 10.0];
            let mut step = inputs(&loads, hour);
            step.battery_active = true;
            let model = DispatchModel::new(&network, &params, &step).unwrap();
            let solution = model.solve(&solver).unwrap();

            for residual in model.balance_residuals(&solution) {
                assert!(residual.abs() < TOL, "hour {hour}: {residual}");
            }
            for g in model.accessors.generation.iter() {
                let value = solution.colvalue[g.column];
                assert!(value >= -TOL && value <= g.limit + TOL);
            }
            for (l, link) in network.links().iter().enumerate() {
                for value in [solution.direct_flow[l], solution.reverse_flow[l]] {
                    assert!(value >= -TOL && value <= link.capacity + TOL);
                }
            }
            assert_eq!(model.battery_terms[2], params.battery.term(hour));
            assert_eq!(model.loads(), loads.to_vec());
        }
    }

    struct ZeroSolver;

    impl Solver for ZeroSolver {
        fn solve(
            &self,
            problem: &Problem,
            _sense: Sense,
        ) -> Result<solver::Solution, Error> {
            Ok(solver::Solution {
                status: solver::Status::Optimal,
                objective: 0.0,
                colvalue: vec![0.0; problem.num_col],
                rowvalue: vec![0.0; problem.num_row],
            })
        }
    }

    fn isolated_load_network() -> Network {
        let nodes = vec![Node::new(1, None, 0.0, Coordinates::new(0.0, 0.0))];
        Network::new(nodes, &[]).unwrap()
    }

    #[test]
    fn test_isolated_load_without_columns_is_infeasible() {
        let network = isolated_load_network();
        let loads = [40.0];
        let model = DispatchModel::new(
            &network,
            &DispatchParameters::default(),
            &inputs(&loads, 0),
        )
        .unwrap();
        assert_eq!(model.problem.num_col, 0);
        assert_eq!(model.problem.num_row, 1);
        let r = model.solve(&HighsSolver::default());
        assert!(matches!(r, Err(Error::Infeasible { step: 0, .. })));
    }

    #[test]
    fn test_isolated_battery_charging_is_infeasible() {
        let network = isolated_load_network();
        let params = DispatchParameters {
            battery_nodes: vec![1],
            ..DispatchParameters::default()
        };
        let loads = [0.0];
        let mut step = inputs(&loads, 3);
        step.battery_active = true;
        let model = DispatchModel::new(&network, &params, &step).unwrap();
        let r = model.solve(&HighsSolver::default());
        assert!(matches!(r, Err(Error::Infeasible { .. })));
    }

    #[test]
    fn test_isolated_node_without_load_is_solved() {
        let network = isolated_load_network();
        let loads = [0.0];
        let model = DispatchModel::new(
            &network,
            &DispatchParameters::default(),
            &inputs(&loads, 0),
        )
        .unwrap();
        let solution = model.solve(&HighsSolver::default()).unwrap();
        assert!(solution.generation.is_empty());
        assert_eq!(model.balance_residuals(&solution), vec![0.0]);
    }

    #[test]
    fn test_zero_dispatch_is_rejected_when_unbalanced() {
        let network = two_node_network(GenerationType::NaturalGas);
        let loads = [0.0, 40.0];
        let model = DispatchModel::new(
            &network,
            &DispatchParameters::default(),
            &inputs(&loads, 5),
        )
        .unwrap();
        match model.solve(&ZeroSolver) {
            Err(Error::Infeasible { step, status, .. }) => {
                assert_eq!(step, 5);
                assert_eq!(status, "Unbalanced");
            }
            other => panic!("expected an unbalanced step, got {other:?}"),
        }
    }

    #[test]
    fn test_battery_terms_are_ignored_when_inactive() {
        let network = radial_network();
        let params = DispatchParameters {
            battery_nodes: vec![3],
            ..DispatchParameters::default()
        };
        let loads = [0.0, 0.0, 30.0, 0.0];
        let model =
            DispatchModel::new(&network, &params, &inputs(&loads, 12)).unwrap();
        assert_eq!(model.battery_terms, vec![0.0; 4]);
    }

    #[test]
    fn test_unknown_battery_node_fails() {
        let network = radial_network();
        let params = DispatchParameters {
            battery_nodes: vec![99],
            ..DispatchParameters::default()
        };
        let loads = [0.0; 4];
        let r = DispatchModel::new(&network, &params, &inputs(&loads, 12));
        assert!(matches!(r, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_load_vector_must_match_nodes() {
        let network = radial_network();
        let loads = [0.0; 3];
        let r = DispatchModel::new(
            &network,
            &DispatchParameters::default(),
            &inputs(&loads, 12),
        );
        assert!(matches!(r, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_idle_node_still_gets_a_balance() {
        let network = radial_network();
        let loads = [0.0, 0.0, 0.0, 0.0];
        let model = DispatchModel::new(
            &network,
            &DispatchParameters::default(),
            &inputs(&loads, 12),
        )
        .unwrap();
        let row = model.accessors.balance[2];
        assert_eq!(model.problem.row_lower[row], 0.0);
        assert_eq!(model.problem.row_upper[row], 0.0);
    }

    #[test]
    fn test_rebuilding_is_idempotent() {
        let network = radial_network();
        let loads = [5.0, 0.0, 60.0, 10.0];
        let params = DispatchParameters::default();
        let step = inputs(&loads, 9);
        let first = DispatchModel::new(&network, &params, &step).unwrap();
        let second = DispatchModel::new(&network, &params, &step).unwrap();
        assert_eq!(first, second);

        let solver = HighsSolver::default();
        assert_eq!(first.solve(&solver).unwrap(), second.solve(&solver).unwrap());
    }
}
