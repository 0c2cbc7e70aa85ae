//! Configuration sources.

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Tokensale.toml";

/// Prefix of the environment variables merged over the configuration file.
pub const ENV_PREFIX: &str = "TOKENSALE_";

/// The configuration file at `path` (or `path/Tokensale.toml` for a directory),
/// overridden by `TOKENSALE_` environment variables with `__` as key separator.
pub fn figment(path: &Path) -> Figment {
    let config_path = if path.is_dir() {
        path.join(CONFIG_FILENAME)
    } else {
        path.to_path_buf()
    };

    Figment::new()
        .merge(Toml::file(config_path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}
