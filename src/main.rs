use crate::cli::run;

pub mod cli;
pub mod collector;
mod config;
pub mod domain;
pub mod enrich;
pub mod lastfm;
pub mod pipeline;
pub mod storage;

fn main() {
    run();
}
