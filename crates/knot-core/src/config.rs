// config: process-wide rendering configuration
//
// Variable descriptions (used in every error message) can list shapes and
// dynamic axes in reverse order, for front ends that present row-major
// shapes to their users. This is a deliberate process-wide setting, not
// per-node state: it is read each time a variable is rendered.
//
// Nothing is read implicitly. Call `RenderConfig::from_env().install()` at
// startup to honor `KNOT_REVERSE_SHAPES`, or set the flag directly.

use std::sync::atomic::{AtomicBool, Ordering};

/// Environment variable consulted by [`RenderConfig::from_env`].
pub const REVERSE_SHAPES_ENV: &str = "KNOT_REVERSE_SHAPES";

static REVERSE_SHAPES_IN_MESSAGES: AtomicBool = AtomicBool::new(false);

/// Whether variable descriptions list axes and shape dims last-to-first.
pub fn reverse_shapes_in_messages() -> bool {
    REVERSE_SHAPES_IN_MESSAGES.load(Ordering::Relaxed)
}

pub fn set_reverse_shapes_in_messages(enabled: bool) {
    REVERSE_SHAPES_IN_MESSAGES.store(enabled, Ordering::Relaxed);
}

/// Rendering settings, applied process-wide by [`RenderConfig::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderConfig {
    pub reverse_shapes: bool,
}

impl RenderConfig {
    /// The currently installed settings.
    pub fn current() -> Self {
        RenderConfig {
            reverse_shapes: reverse_shapes_in_messages(),
        }
    }

    /// Settings taken from the environment; unset means defaults.
    pub fn from_env() -> Self {
        let value = std::env::var(REVERSE_SHAPES_ENV).ok();
        Self::from_env_value(value.as_deref())
    }

    /// Settings for a given value of [`REVERSE_SHAPES_ENV`].
    pub fn from_env_value(value: Option<&str>) -> Self {
        Self::default().with_reverse_shapes(parse_flag(value))
    }

    pub fn with_reverse_shapes(mut self, reverse: bool) -> Self {
        self.reverse_shapes = reverse;
        self
    }

    pub fn install(self) {
        log::debug!("installing render config {:?}", self);
        set_reverse_shapes_in_messages(self.reverse_shapes);
    }
}

fn parse_flag(value: Option<&str>) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some("1")));
        assert!(parse_flag(Some(" TRUE ")));
        assert!(parse_flag(Some("on")));
        assert!(!parse_flag(Some("0")));
        assert!(!parse_flag(Some("")));
        assert!(!parse_flag(None));
    }

    #[test]
    fn test_builder() {
        let c = RenderConfig::default().with_reverse_shapes(true);
        assert!(c.reverse_shapes);
        assert!(!RenderConfig::default().reverse_shapes);
    }
}
