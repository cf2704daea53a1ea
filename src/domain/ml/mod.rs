// Pure pieces of the training-and-inference pipeline
pub mod confidence;
pub mod lifecycle;
pub mod model_spec;
pub mod normalizer;
pub mod training_history;
pub mod window;

pub use lifecycle::RequestState;
pub use model_spec::{LossFunction, ModelProfile, ModelSpec, RecurrentLayerSpec};
pub use normalizer::NormalizedSeries;
pub use training_history::{EpochEvent, TrainingHistory};
pub use window::{Window, WindowDataset};
