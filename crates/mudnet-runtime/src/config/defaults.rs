//! Compile-time defaults, generated by `build.rs`.
//!
//! Override any of them at build time with `MUD_CONFIG_RS=/path/to/file.rs`
//! containing `pub const NAME: TYPE = VALUE;` lines.

include!(concat!(env!("OUT_DIR"), "/mud_merged_config.rs"));
