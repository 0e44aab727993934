/// Request counter that decides when the tunnel is rotated
#[derive(Debug, Clone)]
pub struct RequestBudget {
    spent: u32,
    threshold: u32,
    penalty: u32,
}

impl RequestBudget {
    pub fn new(threshold: u32, penalty: u32) -> Self {
        Self {
            spent: 0,
            threshold,
            penalty,
        }
    }

    /// Charge one scrape attempt, successful or not
    pub fn record_attempt(&mut self) {
        self.spent = self.spent.saturating_add(1);
    }

    /// Charge the extra penalty for a rate-limited attempt
    pub fn record_rate_limit(&mut self) {
        self.spent = self.spent.saturating_add(self.penalty);
    }

    pub fn is_exhausted(&self) -> bool {
        self.spent >= self.threshold
    }

    pub fn reset(&mut self) {
        self.spent = 0;
    }

    pub fn spent(&self) -> u32 {
        self.spent
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
