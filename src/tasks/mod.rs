pub mod lifecycle;
pub mod sampling;
