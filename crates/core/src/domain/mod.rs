pub mod error;
pub mod healing;
pub mod learning;
pub mod turn;
