//! Per-run budget: iteration count and optional wall-clock limit.

use std::time::Duration;
use tokio::time::Instant;

/// Why a run's budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetExhausted {
    Iterations { limit: u32 },
    WallClock { limit: Duration },
}

impl std::fmt::Display for BudgetExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Iterations { limit } => write!(f, "iteration limit of {limit} reached"),
            Self::WallClock { limit } => {
                write!(f, "time limit of {:.1}s reached", limit.as_secs_f64())
            }
        }
    }
}

/// Tracks how much of a run's budget has been used.
///
/// The clock starts when the budget is created.
#[derive(Debug, Clone)]
pub struct RunBudget {
    max_iterations: u32,
    max_wall_clock: Option<Duration>,
    iterations: u32,
    started_at: Instant,
}

impl RunBudget {
    pub fn new(max_iterations: u32, max_wall_clock: Option<Duration>) -> Self {
        Self {
            max_iterations,
            max_wall_clock,
            iterations: 0,
            started_at: Instant::now(),
        }
    }

    /// Count one completed tool round.
    pub fn tick(&mut self) {
        self.iterations = self.iterations.saturating_add(1);
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// `Some` once either limit is reached. Checked before each round.
    pub fn exhausted(&self) -> Option<BudgetExhausted> {
        if self.iterations >= self.max_iterations {
            return Some(BudgetExhausted::Iterations {
                limit: self.max_iterations,
            });
        }
        match self.max_wall_clock {
            Some(limit) if self.elapsed() >= limit => Some(BudgetExhausted::WallClock { limit }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_limit() {
        let mut budget = RunBudget::new(2, None);
        assert!(budget.exhausted().is_none());
        budget.tick();
        assert!(budget.exhausted().is_none());
        budget.tick();
        assert_eq!(
            budget.exhausted(),
            Some(BudgetExhausted::Iterations { limit: 2 })
        );
    }

    #[test]
    fn zero_iterations_is_exhausted_immediately() {
        assert!(RunBudget::new(0, None).exhausted().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn wall_clock_limit() {
        let budget = RunBudget::new(100, Some(Duration::from_secs(5)));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(budget.exhausted().is_none());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(
            budget.exhausted(),
            Some(BudgetExhausted::WallClock {
                limit: Duration::from_secs(5)
            })
        );
    }

    #[test]
    fn display_names_the_limit() {
        let reason = BudgetExhausted::Iterations { limit: 15 }.to_string();
        assert_eq!(reason, "iteration limit of 15 reached");
    }
}
