pub mod logs;
pub mod traces;
