use crate::RollingWindow;
use serde::{Deserialize, Serialize};

/// Trailing mean and sample standard deviation at one position of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingStat {
    pub mean: f64,
    /// NaN when fewer than two observations were in the window.
    pub std: f64,
}

/// Rolling statistics aligned one-to-one with `values`.
///
/// The statistic at index `i` covers the last `window` observations ending
/// at and including `i`; before `window` observations exist the window
/// simply grows. Callers wanting an expectation for `values[i]` that does
/// not see `values[i]` read the statistic at `i - 1`.
pub fn rolling_stats(values: &[f64], window: usize) -> Vec<RollingStat> {
    let mut rolling = RollingWindow::new(window);

    values
        .iter()
        .map(|&value| {
            rolling.push(value);
            RollingStat {
                mean: rolling.mean(),
                std: rolling.std_dev(),
            }
        })
        .collect()
}
