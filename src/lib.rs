pub mod config;
pub mod content_type;
pub mod dispatcher;
pub mod errors;
pub mod handler;
pub mod metrics;
pub mod request;
pub mod scenario;
pub mod template;
pub mod transformer;
pub mod user;
pub mod yaml_config;
