//! Process-wide shader toolchain state.

use std::sync::OnceLock;

use naga::valid::{Capabilities, ValidationFlags, Validator};

/// Settings shared by every cross-compile in the process.
///
/// Initialised once on first use and kept for the lifetime of the process.
#[derive(Debug)]
pub struct ShaderToolchain {
    validation_flags: ValidationFlags,
    capabilities: Capabilities,
}

static TOOLCHAIN: OnceLock<ShaderToolchain> = OnceLock::new();

impl ShaderToolchain {
    /// Returns the toolchain, initialising it on the first call.
    pub fn ensure_initialized() -> &'static ShaderToolchain {
        TOOLCHAIN.get_or_init(|| {
            log::info!("initialising slang shader toolchain (naga)");
            ShaderToolchain {
                validation_flags: ValidationFlags::all(),
                capabilities: Capabilities::all(),
            }
        })
    }

    pub fn is_initialized() -> bool {
        TOOLCHAIN.get().is_some()
    }

    /// A fresh validator configured for slang stages.
    pub fn validator(&self) -> Validator {
        Validator::new(self.validation_flags, self.capabilities)
    }
}
