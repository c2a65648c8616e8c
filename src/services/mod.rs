pub mod food_pipeline;
pub mod photo_jobs;

pub use food_pipeline::{FoodPipeline, ProcessingResult};
pub use photo_jobs::PhotoJobs;
