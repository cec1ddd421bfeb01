pub mod assembly;
pub mod balance;
pub mod constants;
pub mod effect;
pub mod error;
pub mod matching;
pub mod propensity;
pub mod structures;
pub mod study;
