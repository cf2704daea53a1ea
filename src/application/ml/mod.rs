// Numeric core of the prediction pipeline
pub mod adam;
pub mod backend;
pub mod dense;
pub mod init;
pub mod lstm;
pub mod observer;
pub mod pipeline;
pub mod predictor;
pub mod sequence_model;
pub mod trainer;

pub use backend::{NumericBackend, RequestScope};
pub use observer::{
    CancellationFlag, ChannelObserver, LoggingObserver, NullObserver, TrainingObserver,
    progress_channel,
};
pub use pipeline::PipelineOutput;
pub use trainer::{TrainedModel, Trainer};
