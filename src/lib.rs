pub mod bench;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod registration;
pub mod report;
pub mod runner;
pub mod trajectory;
pub mod transform;
pub mod viz;
