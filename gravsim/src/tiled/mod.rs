pub mod buffer;
pub mod device;
pub mod kernel;
pub mod solver;
pub mod worker;
