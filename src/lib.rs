// Library for tests to access modules

pub mod aggregator;
pub mod bucket;
pub mod collector;
pub mod config;
pub mod duration;
pub mod history;
pub mod models;
pub mod query;
pub mod retention;
pub mod rollup;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod tiers;
