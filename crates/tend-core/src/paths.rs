//! Well-known locations on the remote server filesystem.

/// Directory all addon checkouts live under.
pub const ADDONS_DIR: &str = "/garrysmod/addons";

/// JSON manifest of installed addons, written by the server-side companion.
pub const GIT_INFO_PATH: &str = "/garrysmod/data/tend/gitinfo.json";

/// The server's main configuration file.
pub const SERVER_CFG_PATH: &str = "/garrysmod/cfg/server.cfg";

/// Path of an addon directory inside [`ADDONS_DIR`].
pub fn addon_path(name: &str) -> String {
    format!("{ADDONS_DIR}/{name}")
}
