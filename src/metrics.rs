use crate::dispatch::{DispatchModel, StepSolution};
use crate::system::{GenerationType, Network};
use crate::utils;

/// Summary of a single solved time step
#[derive(Debug, Clone, PartialEq)]
pub struct StepMetrics {
    pub step: usize,
    pub hour: usize,
    /// Time identifier of the step, as found in the loads table
    pub time: f64,
    /// Generation by source, indexed by [`GenerationType::index`]
    pub usage: [f64; 6],
    /// Effective generation limits by source, after renewable scaling
    pub limit: [f64; 6],
    pub total_generated: f64,
    /// Reference net demand of the step, reported but never enforced
    pub total_consumed: f64,
    /// Sum of solved flow times link distance, in MW.mi
    pub power_distance: f64,
    pub objective: f64,
    /// Identifier of the node with the largest demand
    pub peak_load_node: Option<usize>,
}

impl StepMetrics {
    pub fn aggregate(
        network: &Network,
        model: &DispatchModel,
        solution: &StepSolution,
        time: f64,
        net_load: f64,
    ) -> Self {
        let mut usage = [0.0; 6];
        let mut limit = [0.0; 6];
        for (g, value) in model
            .accessors
            .generation
            .iter()
            .zip(solution.generation.iter())
        {
            usage[g.kind.index()] += value;
            limit[g.kind.index()] += g.limit;
        }
        let total_generated = usage.iter().sum::<f64>();

        let power_distance =
            utils::dot_product(&solution.direct_flow, &model.distances)
                + utils::dot_product(&solution.reverse_flow, &model.distances);

        let peak_load_node = model
            .loads()
            .iter()
            .enumerate()
            .filter(|(_, load)| **load > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| network.nodes()[index].id);

        Self {
            step: model.step,
            hour: model.hour,
            time,
            usage,
            limit,
            total_generated,
            total_consumed: net_load,
            power_distance,
            objective: solution.objective,
            peak_load_node,
        }
    }

    pub fn usage_of(&self, kind: GenerationType) -> f64 {
        self.usage[kind.index()]
    }

    pub fn limit_of(&self, kind: GenerationType) -> f64 {
        self.limit[kind.index()]
    }

    /// Coal plus natural gas generation
    pub fn fossil_generation(&self) -> f64 {
        GenerationType::ALL
            .iter()
            .filter(|kind| kind.is_fossil())
            .map(|kind| self.usage_of(*kind))
            .sum()
    }

    /// Share of a source in the installed capacity it could use, damped
    /// by one MW so that sources without capacity read as zero
    pub fn utilisation(&self, kind: GenerationType) -> f64 {
        self.usage_of(kind) / (self.limit_of(kind) + 1.0)
    }

    /// Consumed over generated power
    pub fn efficiency(&self) -> Option<f64> {
        (self.total_generated > 0.0)
            .then(|| self.total_consumed / self.total_generated)
    }

    /// Mean distance travelled by each generated MW
    pub fn average_distance(&self) -> Option<f64> {
        (self.total_generated > 0.0)
            .then(|| self.power_distance / self.total_generated)
    }
}
