pub mod lstm;
pub mod records;
pub mod sources;
pub mod yahoo;
