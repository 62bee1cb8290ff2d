mod engine_type;
mod environment;
mod parameters;

pub use engine_type::EngineType;
pub use environment::{EnvironmentAdjuster, InheritedEnvironment};
pub use parameters::EngineParameters;

#[cfg(test)]
mod tests;

const PRIVATE_PATH_SUFFIX: &str = "lumina/dbserver";
const UPGRADE_TOOL_NAME: &str = "mysql_upgrade";
