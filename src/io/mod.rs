pub mod intake;
pub mod progress;
pub mod storage;
