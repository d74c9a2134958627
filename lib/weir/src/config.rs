//! Per-connection configuration propagated through bucket trees.

use serde_derive::Deserialize;

/// Two-state switch using the wire spelling `"Y"` / `"N"`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub enum Toggle {
    #[serde(rename = "Y")]
    Yes,
    #[serde(rename = "N")]
    No,
}

impl Toggle {
    #[inline]
    pub fn enabled(self) -> bool {
        self == Toggle::Yes
    }
}

impl Default for Toggle {
    fn default() -> Toggle {
        Toggle::No
    }
}

/// Connection-scoped settings. Unknown keys are ignored so the surface can
/// grow without breaking stored configs.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Config {
    /// Requests are pipelined on this connection. A mid-connection TLS
    /// renegotiation would scramble request ordering, so enabling this also
    /// enables renegotiation detection.
    #[serde(rename = "CONN_PIPELINING", default)]
    pub pipelining: Toggle,

    /// Preferred size of a single pull from an upstream source.
    #[serde(rename = "READ_CHUNK", default = "defaults::read_chunk")]
    pub read_chunk: usize,
}

mod defaults {
    pub fn read_chunk() -> usize {
        8192
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            pipelining: Toggle::default(),
            read_chunk: defaults::read_chunk(),
        }
    }
}

impl Config {
    /// Parse a TOML snippet into a config. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Config, serdeconv::Error> {
        serdeconv::from_toml_str(text)
    }
}
