pub mod catalog;
pub mod decoder;
pub mod dispatch;
pub mod domain;
pub mod evaluator;
pub mod traits;
pub mod wrapping;
