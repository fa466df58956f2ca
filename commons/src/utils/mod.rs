use std::env;

use anyhow::{Context, Result};
use log::debug;

pub struct EnvUtility;
pub struct LogUtility;

impl EnvUtility {
    pub const PORT_VAR: &'static str = "PORT";
    pub const DEFAULT_PORT: u16 = 8080;

    /// Listening port from `PORT`, 8080 when unset or empty.
    pub fn port() -> Result<u16> {
        Self::parse_port(env::var(Self::PORT_VAR).ok().as_deref())
    }

    fn parse_port(value: Option<&str>) -> Result<u16> {
        match value.map(str::trim) {
            None | Some("") => {
                debug!("{} not set, using {}", Self::PORT_VAR, Self::DEFAULT_PORT);
                Ok(Self::DEFAULT_PORT)
            }
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid {} value {:?}", Self::PORT_VAR, raw)),
        }
    }
}

impl LogUtility {
    pub const DEFAULT_FILTER: &'static str = "info";

    /// Installs `env_logger`, honoring `RUST_LOG` and falling back to `info`.
    /// Safe to call more than once; later calls are no-ops.
    pub fn init() {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(Self::DEFAULT_FILTER),
        )
        .format_timestamp_millis()
        .try_init();
    }
}
