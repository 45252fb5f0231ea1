use crate::alloc::vec;
use crate::alloc::vec::Vec;
use crate::errors::ResidualError;

/// Propagation mode of a single landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationMode {
    /// motion-compensated propagation
    Tracked,
    /// noise-only random walk, decoupled from the ego-motion
    Frozen,
}

impl From<bool> for PropagationMode {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Tracked
        } else {
            Self::Frozen
        }
    }
}

/// Per-landmark propagation flags, index-aligned with the landmark array.
///
/// The length is fixed at construction. Every landmark starts `Tracked`; only
/// `set` changes a flag and nothing here decides when to do so.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationFlags {
    flags: Vec<bool>,
}

impl PropagationFlags {
    pub fn all_enabled(count: usize) -> Self {
        Self {
            flags: vec![true; count],
        }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn is_enabled(&self, index: usize) -> Result<bool, ResidualError> {
        self.flags
            .get(index)
            .copied()
            .ok_or(ResidualError::LandmarkIndexOutOfRange {
                index,
                count: self.flags.len(),
            })
    }

    pub fn mode(&self, index: usize) -> Result<PropagationMode, ResidualError> {
        self.is_enabled(index).map(PropagationMode::from)
    }

    /// Sets the flag of landmark `index`, returning the previous value.
    pub fn set(&mut self, index: usize, enabled: bool) -> Result<bool, ResidualError> {
        let count = self.flags.len();
        let flag = self
            .flags
            .get_mut(index)
            .ok_or(ResidualError::LandmarkIndexOutOfRange { index, count })?;
        Ok(core::mem::replace(flag, enabled))
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.flags.iter().copied()
    }

    pub fn enabled_count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }
}
