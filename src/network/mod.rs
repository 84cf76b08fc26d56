pub mod browser;
pub mod client;
pub mod context;
pub mod middleware;
pub mod pool;
pub mod service;
pub mod session;
