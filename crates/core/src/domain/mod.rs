pub mod catalog;
pub mod instrument;
