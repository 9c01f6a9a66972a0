pub mod engine;
pub mod states;
