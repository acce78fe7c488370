//! Command-line plumbing shared by the `neogate` binary

pub mod options;

pub use options::{parse_json_object, print_json, ConnectionOverrides};
