pub mod adapter;
pub mod backend;
pub mod config;
pub mod dashboard;
pub mod fleet;
pub mod limits;
pub mod listener;
pub mod model;
pub mod notify;
pub mod observability;
pub mod push;
pub mod sync;
pub mod view;
