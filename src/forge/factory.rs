//! forge::factory
//!
//! Forge creation from configuration.
//!
//! Commands use `create_forge()` instead of constructing a specific client,
//! so the engine only ever sees `&dyn Forge` and tests can substitute the
//! mock without touching command code.

use tracing::debug;

use super::github::GitHubForge;
use super::traits::{Forge, ForgeError};
use crate::core::config::Config;

/// Create the forge client described by `config`.
///
/// # Errors
///
/// Returns `ForgeError::AuthRequired` if no token is configured, either
/// literally or through the configured environment variable.
///
/// # Example
///
/// ```no_run
/// use polypatch::core::config::Config;
/// use polypatch::forge::create_forge;
///
/// let config = Config::load(None).unwrap();
/// let forge = create_forge(&config).unwrap();
/// assert_eq!(forge.name(), "github");
/// ```
pub fn create_forge(config: &Config) -> Result<Box<dyn Forge>, ForgeError> {
    let token = config.token().ok_or(ForgeError::AuthRequired)?;
    debug!(
        api_base = config.api_base(),
        max_in_flight = config.max_in_flight(),
        "creating github forge"
    );
    Ok(Box::new(
        GitHubForge::new(token)
            .with_api_base(config.api_base())
            .with_max_in_flight(config.max_in_flight()),
    ))
}
