use serde::{Deserialize, Serialize};

/// Losses recorded at the end of one epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochEvent {
    /// 1-based epoch number
    pub epoch: usize,
    pub total_epochs: usize,
    pub loss: f64,
    pub val_loss: Option<f64>,
}

/// Per-epoch loss trajectory of one training run, in epoch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    epochs: Vec<EpochEvent>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(epochs: usize) -> Self {
        Self {
            epochs: Vec::with_capacity(epochs),
        }
    }

    pub fn record(&mut self, event: EpochEvent) {
        self.epochs.push(event);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Replays the recorded events from the first epoch; can be called any number of times.
    pub fn events(&self) -> impl Iterator<Item = &EpochEvent> + '_ {
        self.epochs.iter()
    }

    pub fn losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.loss).collect()
    }

    pub fn val_losses(&self) -> Vec<f64> {
        self.epochs.iter().filter_map(|e| e.val_loss).collect()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.loss)
    }

    pub fn final_val_loss(&self) -> Option<f64> {
        self.epochs.last().and_then(|e| e.val_loss)
    }
}
