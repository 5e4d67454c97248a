//! Captured pixel buffers: a most-recent-first ring shared by every pen, plus
//! named registers.
//!
//! Register keys are single characters. Uppercase letters name global
//! registers held here; everything else names a register local to the pen
//! doing the yank or paste, passed in as [`Registers`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tiny_skia::Pixmap;

pub type Buffer = Arc<Pixmap>;

/// The key that pastes the most recent ring entry.
pub const PASTE_LATEST: char = 'p';

/// Registers owned by a single pen.
#[derive(Debug, Default, Clone)]
pub struct Registers {
    slots: HashMap<char, Buffer>,
}

impl Registers {
    pub fn get(&self, key: char) -> Option<&Buffer> {
        self.slots.get(&key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug)]
pub struct Clipboard {
    ring: VecDeque<Buffer>,
    capacity: usize,
    registers: HashMap<char, Buffer>,
}

impl Clipboard {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            registers: HashMap::new(),
        }
    }

    /// Whether `key` names a global register.
    pub fn is_global(key: char) -> bool {
        key.is_alphabetic() && key.is_uppercase()
    }

    /// Pushes onto the front of the ring, dropping the oldest entry past
    /// capacity.
    pub fn store(&mut self, buffer: Buffer) {
        self.ring.push_front(buffer);
        self.ring.truncate(self.capacity);
    }

    /// Stores `buffer` under `key` (global or in `local`) and in the ring.
    pub fn register(&mut self, key: char, buffer: Buffer, local: &mut Registers) {
        if Self::is_global(key) {
            self.registers.insert(key, Arc::clone(&buffer));
        } else {
            local.slots.insert(key, Arc::clone(&buffer));
        }
        log::debug!("Yanked {}x{} into register `{}`", buffer.width(), buffer.height(), key);
        self.store(buffer);
    }

    /// Resolves a paste key: `p`/`P` is the newest ring entry, a digit is a
    /// ring index, anything else a register.
    pub fn paste(&self, key: char, local: &Registers) -> Option<Buffer> {
        if key.eq_ignore_ascii_case(&PASTE_LATEST) {
            return self.ring.front().cloned();
        }
        if let Some(index) = key.to_digit(10) {
            return self.ring.get(index as usize).cloned();
        }
        if Self::is_global(key) {
            self.registers.get(&key).cloned()
        } else {
            local.get(key).cloned()
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &Buffer> {
        self.ring.iter()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(width: u32) -> Buffer {
        Arc::new(Pixmap::new(width, 1).unwrap())
    }

    #[test]
    fn ring_keeps_most_recent_first() {
        let mut clipboard = Clipboard::new(10);
        for width in 1..=12 {
            clipboard.store(buffer(width));
        }
        let widths: Vec<u32> = clipboard.items().map(|b| b.width()).collect();
        assert_eq!(widths, (3..=12).rev().collect::<Vec<_>>());
    }

    #[test]
    fn paste_keys_resolve_ring_and_registers() {
        let mut clipboard = Clipboard::new(10);
        let mut local = Registers::default();
        clipboard.store(buffer(1));
        clipboard.register('a', buffer(2), &mut local);
        clipboard.register('B', buffer(3), &mut local);

        let width = |b: Option<Buffer>| b.map(|b| b.width());
        assert_eq!(width(clipboard.paste('p', &local)), Some(3));
        assert_eq!(width(clipboard.paste('2', &local)), Some(1));
        assert_eq!(width(clipboard.paste('a', &local)), Some(2));
        assert_eq!(width(clipboard.paste('B', &local)), Some(3));
        assert_eq!(width(clipboard.paste('9', &local)), None);

        let other_pen = Registers::default();
        assert_eq!(width(clipboard.paste('a', &other_pen)), None, "lowercase is pen-local");
        assert_eq!(width(clipboard.paste('B', &other_pen)), Some(3), "uppercase is global");
    }
}
