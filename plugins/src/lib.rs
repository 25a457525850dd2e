pub mod delegation;
pub mod factory;
pub mod pricing;
pub mod runner;
pub mod services;
pub mod strategies;

pub use services::PluginServicesFactory;
