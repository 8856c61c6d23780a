pub mod config;
pub mod outlier;
pub mod pipeline;
pub mod process;
pub mod publish;
pub mod quality;
pub mod reliability;
pub mod schema;
pub mod sensitivity;
