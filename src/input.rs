use crate::dispatch::{BatterySchedule, DispatchParameters};
use crate::error::Error;
use crate::geo::Coordinates;
use crate::scenario::{Scenario, ScenarioConfig, WindOutage};
use crate::system::{GenerationType, Network, Node, RawLink};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loss_rate: f64,
    pub num_steps: usize,
    pub first_step: usize,
    pub battery_nodes: Vec<usize>,
    pub battery_capacity: f64,
    pub solar_start_hour: usize,
    pub solar_end_hour: usize,
    pub charge_before_hour: usize,
    pub charge_after_hour: usize,
    pub wind_outage: Option<WindOutage>,
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loss_rate: 0.05 / 100.0,
            num_steps: 24,
            first_step: 0,
            battery_nodes: vec![],
            battery_capacity: 750.0,
            solar_start_hour: 6,
            solar_end_hour: 18,
            charge_before_hour: 7,
            charge_after_hour: 22,
            wind_outage: None,
            parallel: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.loss_rate.is_finite() || self.loss_rate < 0.0 {
            return Err(Error::configuration(format!(
                "invalid loss rate {}",
                self.loss_rate
            )));
        }
        if self.num_steps == 0 {
            return Err(Error::configuration("at least one step is required"));
        }
        if !self.battery_capacity.is_finite() || self.battery_capacity < 0.0 {
            return Err(Error::configuration(format!(
                "invalid battery capacity {}",
                self.battery_capacity
            )));
        }
        if self.solar_start_hour > self.solar_end_hour {
            return Err(Error::configuration(format!(
                "solar window {}..={} is empty",
                self.solar_start_hour, self.solar_end_hour
            )));
        }
        if let Some(outage) = &self.wind_outage {
            if !(0.0..=1.0).contains(&outage.probability) {
                return Err(Error::configuration(format!(
                    "wind outage probability {} outside [0, 1]",
                    outage.probability
                )));
            }
        }
        Ok(())
    }

    pub fn build_scenario_config(&self, scenario: Scenario) -> ScenarioConfig {
        ScenarioConfig {
            scenario,
            num_steps: self.num_steps,
            first_step: self.first_step,
            solar_hours: self.solar_start_hour..=self.solar_end_hour,
            wind_outage: self.wind_outage.clone(),
            parallel: self.parallel,
            dispatch: DispatchParameters {
                loss_rate: self.loss_rate,
                battery_nodes: self.battery_nodes.clone(),
                battery: BatterySchedule {
                    capacity: self.battery_capacity,
                    charge_before_hour: self.charge_before_hour,
                    charge_after_hour: self.charge_after_hour,
                },
            },
        }
    }
}

/// Reads the run parameters, falling back to defaults when the file
/// does not exist.
pub fn read_config_input(filepath: &Path) -> Result<Config, Error> {
    let contents = match fs::read_to_string(filepath) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %filepath.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        Err(e) => return Err(e.into()),
    };
    let parsed: Config = serde_json::from_str(&contents)?;
    parsed.validate()?;
    Ok(parsed)
}

#[derive(Debug, Deserialize)]
pub struct NodeInput {
    #[serde(rename = "Node")]
    pub id: usize,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    #[serde(rename = "Limit")]
    pub limit: Option<f64>,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

impl NodeInput {
    fn build_node(&self) -> Result<Node, Error> {
        let kind = match self.kind.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(name) => Some(name.parse::<GenerationType>()?),
        };
        Ok(Node::new(
            self.id,
            kind,
            self.limit.unwrap_or(0.0),
            Coordinates::new(self.latitude, self.longitude),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct LinkInput {
    #[serde(rename = "Node1")]
    pub node1: usize,
    #[serde(rename = "Node2")]
    pub node2: usize,
    #[serde(rename = "Limit")]
    pub limit: f64,
}

pub fn read_nodes_input<R: io::Read>(rdr: R) -> Result<Vec<NodeInput>, Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut nodes = vec![];
    for record in reader.deserialize() {
        nodes.push(record?);
    }
    Ok(nodes)
}

pub fn read_links_input<R: io::Read>(rdr: R) -> Result<Vec<LinkInput>, Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut links = vec![];
    for record in reader.deserialize() {
        links.push(record?);
    }
    Ok(links)
}

const TIME_COLUMN: &str = "Time";
const NET_COLUMN: &str = "Net";

/// Demand of one row of the loads table
#[derive(Debug, Clone, PartialEq)]
pub struct LoadStep {
    pub time: f64,
    /// Demand per node, in the order of [`LoadProfile::node_ids`]
    pub demand: Vec<f64>,
    /// Reference total demand, for reporting only
    pub net: f64,
}

/// The loads table: one demand column per node plus `Time` and `Net`
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProfile {
    pub node_ids: Vec<usize>,
    pub steps: Vec<LoadStep>,
}

impl LoadProfile {
    pub fn from_reader<R: io::Read>(rdr: R) -> Result<Self, Error> {
        let mut reader = csv::Reader::from_reader(rdr);
        let headers = reader.headers()?.clone();

        let mut time_col = None;
        let mut net_col = None;
        let mut node_cols: Vec<(usize, usize)> = vec![];
        for (col, name) in headers.iter().enumerate() {
            match name.trim() {
                TIME_COLUMN => time_col = Some(col),
                NET_COLUMN => net_col = Some(col),
                other => {
                    let id = other.parse::<usize>().map_err(|_| {
                        Error::configuration(format!(
                            "load column '{other}' is not a node identifier"
                        ))
                    })?;
                    if node_cols.iter().any(|(_, seen)| *seen == id) {
                        return Err(Error::configuration(format!(
                            "load column for node {id} appears twice"
                        )));
                    }
                    node_cols.push((col, id));
                }
            }
        }
        let time_col = time_col.ok_or_else(|| {
            Error::configuration("loads table has no Time column")
        })?;
        let net_col = net_col.ok_or_else(|| {
            Error::configuration("loads table has no Net column")
        })?;

        let mut steps = vec![];
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let field = |col: usize| -> Result<f64, Error> {
                let raw = record.get(col).unwrap_or("").trim();
                raw.parse::<f64>().map_err(|_| {
                    Error::configuration(format!(
                        "invalid number '{raw}' in row {} of the loads table",
                        row + 1
                    ))
                })
            };
            let demand = node_cols
                .iter()
                .map(|(col, _)| field(*col))
                .collect::<Result<Vec<f64>, Error>>()?;
            steps.push(LoadStep {
                time: field(time_col)?,
                demand,
                net: field(net_col)?,
            });
        }

        Ok(Self {
            node_ids: node_cols.into_iter().map(|(_, id)| id).collect(),
            steps,
        })
    }

    /// Checks that every network node has a column and every column
    /// names a network node
    pub fn validate(&self, network: &Network) -> Result<(), Error> {
        for id in self.node_ids.iter() {
            if network.node(*id).is_none() {
                return Err(Error::configuration(format!(
                    "loads table has a column for unknown node {id}"
                )));
            }
        }
        // columns are unique and known, so equal counts mean full coverage
        if self.node_ids.len() != network.meta.nodes_count {
            let known: HashSet<usize> = self.node_ids.iter().copied().collect();
            if let Some(node) =
                network.nodes().iter().find(|n| !known.contains(&n.id))
            {
                return Err(Error::configuration(format!(
                    "loads table has no column for node {}",
                    node.id
                )));
            }
        }
        Ok(())
    }

    /// Demand of every node at row `step`, reordered to match
    /// [`Network::nodes`]. Expects a table already checked with
    /// [`LoadProfile::validate`].
    pub fn loads_for(
        &self,
        network: &Network,
        step: usize,
    ) -> Result<Vec<f64>, Error> {
        let row = self.steps.get(step).ok_or_else(|| {
            Error::configuration(format!(
                "loads table has {} rows, step {step} requested",
                self.steps.len()
            ))
        })?;
        let mut loads = vec![0.0; network.meta.nodes_count];
        for (id, demand) in self.node_ids.iter().zip(row.demand.iter()) {
            if let Some(index) = network.index_of(*id) {
                loads[index] = *demand;
            }
        }
        Ok(loads)
    }

    pub fn demand(&self, step: usize, node_id: usize) -> Option<f64> {
        let col = self.node_ids.iter().position(|id| *id == node_id)?;
        self.steps.get(step).map(|s| s.demand[col])
    }
}

pub struct Input {
    pub config: Config,
    pub network: Network,
    pub loads: LoadProfile,
}

impl Input {
    pub fn build(path: &Path) -> Result<Self, Error> {
        let config = read_config_input(&path.join("config.json"))?;
        let nodes = read_nodes_input(fs::File::open(path.join("nodes.csv"))?)?;
        let links = read_links_input(fs::File::open(path.join("links.csv"))?)?;
        let loads =
            LoadProfile::from_reader(fs::File::open(path.join("loads.csv"))?)?;

        let network = build_network(&nodes, &links)?;
        loads.validate(&network)?;
        for id in config.battery_nodes.iter() {
            if network.node(*id).is_none() {
                return Err(Error::configuration(format!(
                    "battery node {id} is not in the network"
                )));
            }
        }

        info!(
            nodes = network.meta.nodes_count,
            links = network.meta.links_count,
            generators = network.meta.generators_count,
            steps = loads.steps.len(),
            "read input"
        );

        Ok(Self {
            config,
            network,
            loads,
        })
    }
}

pub fn build_network(
    nodes: &[NodeInput],
    links: &[LinkInput],
) -> Result<Network, Error> {
    let nodes = nodes
        .iter()
        .map(|n| n.build_node())
        .collect::<Result<Vec<Node>, Error>>()?;
    let raw_links: Vec<RawLink> = links
        .iter()
        .map(|l| RawLink {
            node1: l.node1,
            node2: l.node2,
            limit: l.limit,
        })
        .collect();
    Network::new(nodes, &raw_links)
}
