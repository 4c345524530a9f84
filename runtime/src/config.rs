// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime configuration.

use derive_builder::Builder;
use std::fmt::Display;

/// How the runtime maps policies onto switches.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Every packet is punted and evaluated on the controller.
    #[default]
    Interpreted,
    /// Rules are synthesized reactively from evaluated packets.
    Reactive0,
    /// The compiled classifier is installed proactively.
    Proactive0,
}

/// Log chattiness of the runtime.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Normal,
    /// Additionally log policies, compiled classifiers and installed rules.
    High,
}

/// Struct to configure the runtime. N.B we derive a builder type
/// `RuntimeParamsBuilder` and provide defaults for each field.
#[derive(Builder, Clone, Debug)]
pub struct RuntimeParams {
    #[builder(setter(into), default = "runtime".to_string())]
    pub name: String,

    #[builder(default)]
    pub mode: Mode,

    #[builder(default)]
    pub verbosity: Verbosity,

    /// Log the received packet and the full output set on every packet-in.
    #[builder(default)]
    pub show_traces: bool,

    /// Log every decoded packet at packet-in time.
    #[builder(default)]
    pub debug_packet_in: bool,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self {
            name: "runtime".to_string(),
            mode: Mode::default(),
            verbosity: Verbosity::default(),
            show_traces: false,
            debug_packet_in: false,
        }
    }
}

impl Display for RuntimeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Runtime config")?;
        writeln!(f, "  name      : {}", self.name)?;
        writeln!(f, "  mode      : {}", self.mode)?;
        writeln!(f, "  verbosity : {}", self.verbosity)?;
        writeln!(f, "  traces    : {}", self.show_traces)?;
        writeln!(f, "  dbg pkt-in: {}", self.debug_packet_in)
    }
}
