pub mod gesture;
pub mod history;
pub mod tools;
