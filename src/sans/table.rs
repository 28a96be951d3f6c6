//! Bindings between local message numbers and message definitions.
//!
//! Documents address definitions through sixteen local message numbers, but
//! may use many more definitions over their lifetime. While decoding, the
//! [`LocalMessageTable`] holds whatever the document last declared for each
//! number. While encoding, the [`SlotAllocator`] decides which number to bind
//! each definition to, evicting the least recently used binding once all
//! numbers are taken.

use core::ops::Range;

use thiserror::Error;
use tracing::debug;

use super::definition::MessageDefinition;

/// Number of local message numbers.
pub const LOCAL_MESSAGES: usize = 16;

/// Local message numbers addressable by compressed timestamp headers.
pub const COMPRESSED_LOCAL_MESSAGES: Range<u8> = 0..4;

/// Local message numbers addressable by normal headers.
pub const NORMAL_LOCAL_MESSAGES: Range<u8> = 0..LOCAL_MESSAGES as u8;

/// A data record referenced a local message number never defined.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Local message {0} has no definition.")]
pub struct UndefinedLocalMessage(pub u8);

/// Definitions bound to local message numbers while decoding.
#[derive(Debug, Default, Clone)]
pub struct LocalMessageTable {
    slots: [Option<MessageDefinition>; LOCAL_MESSAGES],
}

impl LocalMessageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a definition, replacing any earlier binding.
    pub fn define(&mut self, local: u8, definition: MessageDefinition) {
        self.slots[local as usize % LOCAL_MESSAGES] = Some(definition);
    }

    /// The definition bound to a local message.
    pub fn lookup(&self, local: u8) -> Result<&MessageDefinition, UndefinedLocalMessage> {
        self.slots
            .get(local as usize)
            .and_then(Option::as_ref)
            .ok_or(UndefinedLocalMessage(local))
    }

    /// Unbind every local message number.
    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}

/// The outcome of binding a definition for a data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The local message number already holds the definition.
    Reuse(u8),
    /// The definition was bound to the local message number, and a definition
    /// record must be written before the data record.
    Define(u8),
}

impl Assignment {
    pub fn local(self) -> u8 {
        match self {
            Self::Reuse(local) | Self::Define(local) => local,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    definition: MessageDefinition,
    last_used: u64,
}

/// Least-recently-used binding of definitions to local message numbers while
/// encoding.
#[derive(Debug, Default, Clone)]
pub struct SlotAllocator {
    slots: [Option<Slot>; LOCAL_MESSAGES],
    clock: u64,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a definition to a local message number within `range`.
    ///
    /// An existing binding to an equal definition is reused. Otherwise the
    /// lowest unbound number is taken, or failing that, the least recently
    /// used one.
    pub fn assign(&mut self, definition: &MessageDefinition, range: Range<u8>) -> Assignment {
        self.clock += 1;
        let now = self.clock;

        let start = range.start as usize;
        let end = (range.end as usize).min(LOCAL_MESSAGES);
        let slots = &mut self.slots[start..end];

        if let Some((i, slot)) = slots.iter_mut().enumerate().find_map(|(i, s)| {
            s.as_mut()
                .filter(|s| s.definition == *definition)
                .map(|s| (i, s))
        }) {
            slot.last_used = now;
            return Assignment::Reuse((start + i) as u8);
        }

        let free = slots.iter().position(Option::is_none);
        let i = free.unwrap_or_else(|| {
            slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.as_ref().map_or(0, |s| s.last_used))
                .map_or(0, |(i, _)| i)
        });

        if let Some(evicted) = &slots[i] {
            debug!(
                local = start + i,
                evicted = evicted.definition.global,
                global = definition.global,
                "Evicting least recently used definition"
            );
        }

        slots[i] = Some(Slot {
            definition: definition.clone(),
            last_used: now,
        });

        Assignment::Define((start + i) as u8)
    }

    /// The definition currently bound to a local message number.
    pub fn definition(&self, local: u8) -> Option<&MessageDefinition> {
        self.slots
            .get(local as usize)?
            .as_ref()
            .map(|s| &s.definition)
    }
}
