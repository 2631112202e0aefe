//! The execution bridge: one load, one decode, one call, one encode.
//!
//! A bridge invocation reads a single base64 payload from its ingress
//! channel and writes a single base64 payload to its egress channel. The
//! output is fully encoded before the first byte is written, so any failure
//! leaves egress empty.

use std::{
    io::{Read, Write},
    path::Path,
};

use tracing::{debug, info};

use crate::{
    BridgeError, Result,
    messages::{Envelope, FallbackIdPolicy},
    runtime::{self, Contract, EntryPoint, Mode, PlanContract, TaskContract},
};

/// Runs plan and task scripts under the bridge's type contract.
#[derive(Debug, Clone, Default)]
pub struct Bridge {
    policy: FallbackIdPolicy,
}

impl Bridge {
    pub fn new(policy: FallbackIdPolicy) -> Self {
        Self {
            policy,
        }
    }

    pub fn policy(&self) -> &FallbackIdPolicy {
        &self.policy
    }

    /// Loads `script` for `mode` and runs it against one ingress payload.
    pub fn run<R: Read, W: Write>(
        &self,
        mode: Mode,
        script: &Path,
        ingress: R,
        egress: W,
    ) -> Result<()> {
        let loaded = runtime::load_script(script, mode, &self.policy)?;
        info!(%mode, script = %script.display(), language = %loaded.language(), "loaded entry point '{}'", mode.entry_point());

        match mode {
            Mode::Plan => Self::invoke::<PlanContract>(&loaded, ingress, egress),
            Mode::Task => Self::invoke::<TaskContract>(&loaded, ingress, egress),
        }
    }

    /// Decodes one input, calls `entry` once and encodes its output.
    pub fn invoke<C: Contract>(
        entry: &dyn EntryPoint<C>,
        ingress: impl Read,
        mut egress: impl Write,
    ) -> Result<()> {
        let encoded = read_ingress(ingress)?;
        let input = C::Input::from_base64(&encoded)?;
        debug!(mode = %C::MODE, bytes = encoded.len(), "decoded {}", C::Input::type_name());

        let output = entry.call(input)?;
        let payload = output.to_base64();

        egress.write_all(payload.as_bytes())?;
        egress.flush()?;
        debug!(mode = %C::MODE, bytes = payload.len(), "wrote {}", C::Output::type_name());
        Ok(())
    }
}

/// Reads the whole ingress channel, trimmed.
fn read_ingress(mut ingress: impl Read) -> Result<String> {
    let mut buf = Vec::new();
    ingress.read_to_end(&mut buf)?;
    let text = String::from_utf8(buf)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::EmptyInput("No input payload was provided on stdin".to_string()));
    }
    Ok(trimmed.to_string())
}
