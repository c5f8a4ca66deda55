#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod config;
pub mod data;

#[path = "../dataflow/mod.rs"]
pub mod dataflow;

#[path = "../bayes/mod.rs"]
pub mod bayes;

#[path = "../learn/mod.rs"]
pub mod learn;
