use crate::domain::errors::PipelineError;
use crate::domain::ml::normalizer::NormalizedSeries;

/// A run of `window_size` consecutive normalized values and the value that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub input: Vec<f64>,
    pub target: f64,
}

/// Sliding windows over a normalized series, earliest window first.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDataset {
    windows: Vec<Window>,
    window_size: usize,
}

impl WindowDataset {
    pub fn build(series: &NormalizedSeries, window_size: usize) -> Result<Self, PipelineError> {
        let values = series.values();
        if window_size == 0 || values.len() <= window_size {
            return Err(PipelineError::InsufficientData {
                required: window_size + 1,
                actual: values.len(),
            });
        }

        let windows = (0..values.len() - window_size)
            .map(|i| Window {
                input: values[i..i + window_size].to_vec(),
                target: values[i + window_size],
            })
            .collect();

        Ok(Self {
            windows,
            window_size,
        })
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn get(&self, index: usize) -> Option<&Window> {
        self.windows.get(index)
    }
}

/// Trailing `window_size` values, the input for the one-step-ahead forecast.
pub fn last_window(series: &NormalizedSeries, window_size: usize) -> Result<Vec<f64>, PipelineError> {
    let values = series.values();
    if window_size == 0 || values.len() < window_size {
        return Err(PipelineError::InsufficientData {
            required: window_size + 1,
            actual: values.len(),
        });
    }
    Ok(values[values.len() - window_size..].to_vec())
}
