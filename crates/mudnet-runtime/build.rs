//! Build script for mudnet-runtime
//!
//! Merges compile-time configuration defaults:
//! 1. Start with library defaults
//! 2. If MUD_CONFIG_RS is set, parse that file's `pub const` lines
//! 3. User values win over defaults
//! 4. Emit OUT_DIR/mud_merged_config.rs
//!
//! A user file only lists the values it changes.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

/// Every tunable, with its library default.
const CONFIG_PARAMS: &[ConfigParam] = &[
    // Event loop
    ConfigParam { name: "ERROR_LIMIT", rust_type: "usize", default_value: "0" },
    ConfigParam { name: "FATAL_ERRORS", rust_type: "bool", default_value: "false" },
    ConfigParam { name: "SLOW_PASS_MS", rust_type: "u64", default_value: "100" },
    // Sessions and listeners
    ConfigParam { name: "BUFFER_SIZE", rust_type: "usize", default_value: "65536" },
    ConfigParam { name: "SUM_SENDING", rust_type: "usize", default_value: "16" },
    ConfigParam { name: "BACKLOG", rust_type: "usize", default_value: "256" },
    ConfigParam { name: "SEND_VECTOR", rust_type: "usize", default_value: "2" },
    ConfigParam { name: "IDLE_TIMEOUT_MS", rust_type: "u64", default_value: "0" },
    ConfigParam { name: "CONNECT_TIMEOUT_MS", rust_type: "u64", default_value: "10_000" },
    ConfigParam { name: "REQUEST_POOL", rust_type: "usize", default_value: "256" },
    ConfigParam { name: "ACCEPT_BACKOFF_MS", rust_type: "u64", default_value: "100" },
    // Completion driver
    ConfigParam { name: "PROACTOR_EVENTS", rust_type: "usize", default_value: "256" },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest_path = Path::new(&out_dir).join("mud_merged_config.rs");

    let mut config: HashMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    let user_path = env::var("MUD_CONFIG_RS").ok();
    if let Some(path) = &user_path {
        println!("cargo:rerun-if-changed={}", path);
        match fs::read_to_string(path) {
            Ok(content) => {
                parse_and_merge(&content, &mut config);
                println!("cargo:warning=Using custom config: {}", path);
            }
            Err(e) => {
                println!("cargo:warning=Failed to read MUD_CONFIG_RS ({}): {}", path, e);
            }
        }
    }
    println!("cargo:rerun-if-env-changed=MUD_CONFIG_RS");

    let output = generate_config(&config, user_path.is_some());
    fs::write(&dest_path, output).expect("Failed to write merged config");
}

/// Merge `pub const NAME: TYPE = VALUE;` lines over `config`.
fn parse_and_merge(content: &str, config: &mut HashMap<&str, String>) {
    for line in content.lines().map(str::trim) {
        if !line.starts_with("pub const ") {
            continue;
        }
        let Some((name, value)) = parse_const_line(line) else {
            continue;
        };
        match CONFIG_PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                config.insert(param.name, value);
            }
            None => println!("cargo:warning=Unknown config parameter: {}", name),
        }
    }
}

fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();
    let colon = rest.find(':')?;
    let eq = rest.find('=')?;
    let semi = rest.rfind(';').unwrap_or(rest.len());
    if eq < colon || semi < eq {
        return None;
    }
    let name = rest[..colon].trim().to_string();
    let value = rest[eq + 1..semi].trim().to_string();
    Some((name, value))
}

fn generate_config(config: &HashMap<&str, String>, custom: bool) -> String {
    let mut output = String::from("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Configuration merged from library defaults");
    if custom {
        output.push_str(" and MUD_CONFIG_RS");
    }
    output.push_str("\n\n");
    for param in CONFIG_PARAMS {
        let value = config.get(param.name).map_or(param.default_value, String::as_str);
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }
    output
}
