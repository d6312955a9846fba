// Bayesian Belief - running trend-continuation posterior
// Each price move is weighed against the order-flow imbalance behind it

use tracing::trace;

use crate::core::config::RiskConfig;

/// Single Bayes step for a binary hypothesis; the prior survives a zero evidence term
pub fn bayes_update(prior: f64, likelihood: f64) -> f64 {
    let evidence = likelihood * prior + (1.0 - likelihood) * (1.0 - prior);
    if evidence == 0.0 {
        return prior;
    }
    likelihood * prior / evidence
}

#[derive(Debug, Clone)]
pub struct BayesianBelief {
    posterior: f64,
    prior: f64,
    floor: f64,
    strong_flow: f64,
    mild_flow: f64,
    last_close: Option<f64>,
    updates: u64,
}

impl BayesianBelief {
    pub fn new(config: &RiskConfig) -> Self {
        let floor = config.belief_floor.clamp(0.0, 0.5);
        Self {
            posterior: config.belief_prior.clamp(floor, 1.0 - floor),
            prior: config.belief_prior,
            floor,
            strong_flow: config.strong_flow,
            mild_flow: config.mild_flow,
            last_close: None,
            updates: 0,
        }
    }

    /// Likelihood tier for a move in direction `up` given the flow imbalance
    pub fn likelihood(&self, up: bool, ofi: f64) -> f64 {
        let aligned = if up { ofi } else { -ofi };
        if aligned >= self.strong_flow {
            0.8
        } else if aligned > self.mild_flow {
            0.6
        } else if aligned < -self.mild_flow {
            0.3
        } else {
            0.5
        }
    }

    /// Fold a new close into the belief. Unchanged closes leave it untouched.
    pub fn observe(&mut self, close: f64, ofi: f64) -> f64 {
        let Some(prev) = self.last_close.replace(close) else {
            return self.posterior;
        };
        if close == prev {
            return self.posterior;
        }

        let likelihood = self.likelihood(close > prev, ofi);
        self.posterior = bayes_update(self.posterior, likelihood).clamp(self.floor, 1.0 - self.floor);
        self.updates += 1;

        trace!(close = close, ofi = ofi, likelihood = likelihood, posterior = self.posterior, "Belief updated");
        self.posterior
    }

    pub fn posterior(&self) -> f64 {
        self.posterior
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn reset(&mut self) {
        self.posterior = self.prior.clamp(self.floor, 1.0 - self.floor);
        self.last_close = None;
        self.updates = 0;
    }
}
