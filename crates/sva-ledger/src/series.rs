//! Deviation series.
//!
//! # Invariants
//!
//! - **Strictly increasing**: a point is appended only if its height is above
//!   the last point's height. Rejections leave the series untouched.
//! - **Right-open lookup**: [`DeviationSeries::as_of`] returns the cumulative
//!   value of the last point strictly below the query height, so a block being
//!   audited never sees its own contribution.

use serde::{Deserialize, Serialize};

use crate::{Amount, Height, LedgerError};

/// One `(height, cumulative)` point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationPoint {
    pub height: Height,
    pub cumulative: Amount,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviationSeries {
    points: Vec<DeviationPoint>,
}

impl DeviationSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point, enforcing strictly increasing heights.
    pub fn push(&mut self, height: Height, cumulative: Amount) -> Result<(), LedgerError> {
        self.check_next(height)?;
        self.points.push(DeviationPoint { height, cumulative });
        Ok(())
    }

    /// Read-only ordering probe used before any state is touched.
    pub fn check_next(&self, height: Height) -> Result<(), LedgerError> {
        match self.last() {
            Some(last) if height <= last.height => Err(LedgerError::HeightNotIncreasing {
                last: last.height,
                got: height,
            }),
            _ => Ok(()),
        }
    }

    /// Cumulative deviation in effect strictly before `height`.
    ///
    /// Zero when the series is empty or `height` is at or below the first point.
    pub fn as_of(&self, height: Height) -> Amount {
        let idx = self.points.partition_point(|p| p.height < height);
        match idx {
            0 => 0,
            i => self.points[i - 1].cumulative,
        }
    }

    pub fn last(&self) -> Option<&DeviationPoint> {
        self.points.last()
    }

    pub fn points(&self) -> &[DeviationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
