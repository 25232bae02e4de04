pub mod bungie;
pub mod cache;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod fetcher;
pub mod render;
pub mod scheduler;
pub mod storage;
pub mod surface;
pub mod types;
