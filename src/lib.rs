#![recursion_limit = "256"]

pub mod config;
pub mod data;
pub mod dataset;
pub mod labels;
pub mod layers;
pub mod mask;
pub mod model;
pub mod plant_labels;
pub mod stats;
pub mod training;
pub mod transforms;
pub mod via;
pub mod weights;
