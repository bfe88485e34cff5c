pub mod diff;
pub mod ls;
pub mod snapshot;
pub mod synth;
pub mod validate;
