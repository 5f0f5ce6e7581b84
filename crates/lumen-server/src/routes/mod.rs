pub mod collect;
pub mod funnels;
pub mod goals;
pub mod health;
pub mod heatmap;
pub mod query;
pub mod realtime;
pub mod sites;
pub mod stats;
