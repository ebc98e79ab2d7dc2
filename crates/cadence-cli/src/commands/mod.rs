pub mod edit;
pub mod forecast;
pub mod mode;
pub mod rule;
