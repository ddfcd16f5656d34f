// src/core/semantics.rs

//! The semantics bundle attached to every batch: a fixed set of
//! consistency, safety, concurrency and ordering knobs.
//!
//! A `Semantics` value is plain data. It is mutable through its setters while
//! it is uniquely owned; wrapping it in an `Arc` (which `Batch::new` does)
//! freezes it for the rest of its life.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Whether an affected range is locked around execution.
/// Reserved; only `None` is currently honored by the engine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
pub enum Atomicity {
    #[default]
    None,
    Operation,
    Batch,
}

/// Declares the overlap permitted among concurrent clients. The engine
/// consults this only to decide locking.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
pub enum Concurrency {
    None,
    Overlapping,
    #[default]
    NonOverlapping,
}

/// Whether a reply must reflect committed state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
pub enum Consistency {
    #[default]
    Immediate,
    Eventual,
    Session,
}

/// Permits reordering within a batch for merging.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
pub enum Ordering {
    Strict,
    #[default]
    SemiRelaxed,
    Relaxed,
}

/// The durability requested for the data itself; folded into the effective
/// safety (see [`Semantics::effective_safety`]).
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum Persistency {
    #[default]
    None,
    Network,
    Storage,
}

/// The ack policy for a request.
///
/// `None` is fire-and-forget, `Network` awaits a reply, `Storage` makes the
/// server flush to stable storage before replying. The variants are ordered
/// so that `max` picks the strongest guarantee.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum Safety {
    #[default]
    None,
    Network,
    Storage,
}

/// A named preset fixing all axes at once.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
pub enum Template {
    #[default]
    Default,
    Posix,
    Temporary,
}

/// An immutable-once-shared bundle of the axes above.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Semantics {
    atomicity: Atomicity,
    concurrency: Concurrency,
    consistency: Consistency,
    ordering: Ordering,
    persistency: Persistency,
    safety: Safety,
}

impl Default for Semantics {
    fn default() -> Self {
        Self::new(Template::Default)
    }
}

impl Semantics {
    /// Creates a new semantics bundle from a template.
    pub fn new(template: Template) -> Self {
        match template {
            Template::Default => Self {
                atomicity: Atomicity::None,
                concurrency: Concurrency::NonOverlapping,
                consistency: Consistency::Immediate,
                ordering: Ordering::SemiRelaxed,
                persistency: Persistency::None,
                safety: Safety::Network,
            },
            // POSIX-like behavior: concurrent overlapping writers are legal
            // and every operation is acknowledged.
            Template::Posix => Self {
                atomicity: Atomicity::Operation,
                concurrency: Concurrency::Overlapping,
                consistency: Consistency::Immediate,
                ordering: Ordering::SemiRelaxed,
                persistency: Persistency::None,
                safety: Safety::Network,
            },
            // Scratch data: no acks, free reordering.
            Template::Temporary => Self {
                atomicity: Atomicity::None,
                concurrency: Concurrency::None,
                consistency: Consistency::Eventual,
                ordering: Ordering::Relaxed,
                persistency: Persistency::None,
                safety: Safety::None,
            },
        }
    }

    pub fn atomicity(&self) -> Atomicity {
        self.atomicity
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    pub fn ordering(&self) -> Ordering {
        self.ordering
    }

    pub fn persistency(&self) -> Persistency {
        self.persistency
    }

    /// The raw safety axis, before folding in persistency.
    pub fn safety(&self) -> Safety {
        self.safety
    }

    /// The strongest of the persistency and safety axes. This is what the
    /// engine and the wire protocol act on.
    pub fn effective_safety(&self) -> Safety {
        let from_persistency = match self.persistency {
            Persistency::None => Safety::None,
            Persistency::Network => Safety::Network,
            Persistency::Storage => Safety::Storage,
        };
        self.safety.max(from_persistency)
    }

    pub fn set_atomicity(&mut self, atomicity: Atomicity) {
        self.atomicity = atomicity;
    }

    pub fn set_concurrency(&mut self, concurrency: Concurrency) {
        self.concurrency = concurrency;
    }

    pub fn set_consistency(&mut self, consistency: Consistency) {
        self.consistency = consistency;
    }

    pub fn set_ordering(&mut self, ordering: Ordering) {
        self.ordering = ordering;
    }

    pub fn set_persistency(&mut self, persistency: Persistency) {
        self.persistency = persistency;
    }

    pub fn set_safety(&mut self, safety: Safety) {
        self.safety = safety;
    }
}
