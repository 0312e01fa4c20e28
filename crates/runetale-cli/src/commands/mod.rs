pub mod deploy;
pub mod graph;
pub mod reference;
pub mod run;
