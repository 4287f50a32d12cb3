use thiserror::Error;

/// Failures raised while loading the network or dispatching it
#[derive(Debug, Error)]
pub enum Error {
    /// Inconsistent or incomplete input data
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The solver found no optimal dispatch for a time step
    #[error("{scenario} scenario is infeasible at step {step} (status: {status})")]
    Infeasible {
        scenario: String,
        step: usize,
        status: String,
    },

    /// The optimization engine rejected the model
    #[error("solver error: {0}")]
    Solver(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message() {
        let e = Error::configuration("link 1 -> 9 references unknown node 9");
        assert_eq!(
            e.to_string(),
            "configuration error: link 1 -> 9 references unknown node 9"
        );
    }

    #[test]
    fn test_infeasible_message() {
        let e = Error::Infeasible {
            scenario: "Base".to_string(),
            step: 3,
            status: "Infeasible".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Base scenario is infeasible at step 3 (status: Infeasible)"
        );
    }
}
