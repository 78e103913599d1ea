// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::flexi_logger::Logger;
use ::std::{
    mem,
    sync::Once,
};

//==============================================================================
// Constants
//==============================================================================

/// Log specification used when `RUST_LOG` is not set in the environment.
const DEFAULT_LOG_SPEC: &str = "info";

//==============================================================================
// Static Variables
//==============================================================================

/// Guardian to the logging initialize function.
static INIT_LOG: Once = Once::new();

//==============================================================================
// Standalone Functions
//==============================================================================

/// Initializes logging features.
pub fn initialize() {
    INIT_LOG.call_once(|| {
        if let Ok(logger) = Logger::try_with_env_or_str(DEFAULT_LOG_SPEC) {
            if let Ok(handle) = logger.start() {
                // The handle shuts the logger down when dropped, so keep it alive for the whole process.
                mem::forget(handle);
            }
        }
    });
}
