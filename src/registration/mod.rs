mod pipeline;

pub use pipeline::{PipelineConfig, RegistrationPipeline, RegistrationResult};
