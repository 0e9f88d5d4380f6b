use crate::{Error, Result, MIN_DIRECT};

/// Access mode of an open file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    ReadOnly,
    #[default]
    ReadWrite,
}

impl Mode {
    pub fn is_writable(self) -> bool {
        self == Mode::ReadWrite
    }
}

/// Run-time settings of a [`FitsFile`](crate::FitsFile) handle.
///
/// The number of buffer slots is a compile-time parameter of the handle type,
/// everything else lives here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileConfig {
    pub mode: Mode,
    pub direct_threshold: usize,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            mode: Mode::ReadWrite,
            direct_threshold: MIN_DIRECT,
        }
    }
}

impl FileConfig {
    pub fn read_only() -> Self {
        Self {
            mode: Mode::ReadOnly,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_direct_threshold(mut self, direct_threshold: usize) -> Self {
        self.direct_threshold = direct_threshold;
        self
    }

    /// The direct path fills the current slot with the head of a transfer and
    /// keeps the tail in it, so it needs at least three blocks to work with.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.direct_threshold < MIN_DIRECT {
            return Err(Error::InvalidArgument(format!(
                "direct threshold {} is below the minimum of {} bytes",
                self.direct_threshold, MIN_DIRECT
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_writable_with_minimum_threshold() {
        let config = FileConfig::default();
        assert!(config.mode.is_writable());
        assert_eq!(config.direct_threshold, MIN_DIRECT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn small_direct_threshold_is_rejected() {
        let config = FileConfig::read_only().with_direct_threshold(1024);
        assert_eq!(config.mode, Mode::ReadOnly);
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }
}
