mod dirs;
mod node;
mod settings;

pub use dirs::Directories;
pub use node::{DEFAULT_MACHINEKIT_INI, MACHINEKIT_INI_ENV, NodeConfig};
pub use settings::ServerSettings;

/// Parse an INI boolean (`1/yes/true/on`, `0/no/false/off`).
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}
