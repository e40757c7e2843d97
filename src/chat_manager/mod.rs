pub mod gateway;
pub mod prompt_engine;
pub mod provider_adapter;
pub mod request;
pub mod types;
