pub mod commands;
pub mod deploy;
pub mod fleet;
pub mod package;
pub mod release;
pub mod remote;
pub mod runtime;
