use ndarray::{Array1, ArrayView1, s};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Linear model parameters. Index 0 is the bias, the rest are feature weights.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq)]
pub struct Coefficients(pub Array1<f64>);

impl Coefficients {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }

    /// All-zero parameters for `features` features plus the bias.
    pub fn zeros_for_features(features: usize) -> Self {
        Self(Array1::zeros(features + 1))
    }

    pub fn bias(&self) -> Option<f64> {
        self.0.first().copied()
    }

    /// The feature weights, without the bias.
    pub fn weights(&self) -> ArrayView1<'_, f64> {
        if self.0.is_empty() {
            self.0.view()
        } else {
            self.0.slice(s![1..])
        }
    }

    pub fn feature_count(&self) -> usize {
        self.0.len().saturating_sub(1)
    }
}

impl Deref for Coefficients {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Coefficients {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Array1<f64>> for Coefficients {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

impl From<Vec<f64>> for Coefficients {
    fn from(values: Vec<f64>) -> Self {
        Self(Array1::from(values))
    }
}

/// Comma-separated, the format `fit` prints and `--theta` accepts.
impl fmt::Display for Coefficients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, value) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}
