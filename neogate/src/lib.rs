pub mod cli;

pub use cli::{parse_json_object, print_json, ConnectionOverrides};
