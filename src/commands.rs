pub mod authorise;
pub mod prompt;
