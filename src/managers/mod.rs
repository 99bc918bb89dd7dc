pub mod backup;
pub mod logging;
pub mod prompt;
pub mod registry;
pub mod scheduler;
