pub mod atomic;
pub mod expression;
pub mod table;
