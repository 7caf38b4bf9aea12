pub mod actuator;
pub mod config;
pub mod control;
pub mod frame;
pub mod geometry;
pub mod logging;
pub mod motion;
pub mod pose;
pub mod tracker;
