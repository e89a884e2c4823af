pub mod audit;
pub mod events;
pub mod lifecycle;
pub mod repository;
pub mod scheduler;
pub mod storage;
