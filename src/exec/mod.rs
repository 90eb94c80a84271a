//! Exec - bounded subprocess execution

pub mod runner;

#[cfg(test)]
mod tests;

pub use runner::ExecOutcome;
