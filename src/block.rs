use std::ops::{Deref, DerefMut};

use crate::BLOCK_SIZE;

/// Fill byte for binary data regions and for blocks inserted at the start of
/// a file.
pub const ZERO_FILL: u8 = 0;
/// Fill byte for headers and for ASCII table data regions.
pub const BLANK_FILL: u8 = b' ';

/// The contents of one 2880-byte FITS block.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    contents: Box<[u8; BLOCK_SIZE]>,
}

impl Block {
    pub fn new() -> Self {
        Self::filled(ZERO_FILL)
    }

    pub fn filled(byte: u8) -> Self {
        Self {
            contents: Box::new([byte; BLOCK_SIZE]),
        }
    }

    pub fn fill(&mut self, byte: u8) {
        self.contents.fill(byte);
    }

    /// Returns true when every byte of the block equals `byte`.
    pub fn is_filled_with(&self, byte: u8) -> bool {
        self.contents.iter().all(|&b| b == byte)
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let head: Vec<u8> = self.contents.iter().take(16).copied().collect();
        f.debug_struct("Block").field("head", &head).finish()
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.contents[..]
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.contents[..]
    }
}
