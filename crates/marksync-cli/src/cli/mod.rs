pub mod config;
pub mod script;
pub mod simulate;

pub use config::resolve_config;
pub use script::{parse_script, Step};
pub use simulate::{Simulation, SimulationReport};
