mod plan;
mod progress;
mod runner;
mod signals;


pub(crate) use runner::run_load_test;
