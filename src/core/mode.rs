//! # Serialization Modes
//!
//! A mode is chosen once per operation and fixes which wire capabilities are active.
//! It is not a runtime state machine: the encoder records the resulting capability set
//! in the header flags and the decoder reads it back from there.
//!
//! | Mode | keyed | refs | type tags | streaming | bit-packed | debug |
//! |---|---|---|---|---|---|---|
//! | Object | | | | | | |
//! | VersionTolerant | x | | | | | |
//! | CircularReference | | x | | | | |
//! | Polymorphic | | | x | | | |
//! | Streaming | | | | x | | |
//! | Full | x | x | x | | | |
//! | Compact | | | | | x | |
//! | Debug | x | x | x | | | x |

use crate::core::header::HeaderFlags;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SerializationMode {
    /// Ordered members, no per-member tags. Smallest and fastest; not tolerant to
    /// member changes.
    #[default]
    Object,
    VersionTolerant,
    CircularReference,
    Polymorphic,
    Streaming,
    Full,
    Compact,
    Debug,
}

impl SerializationMode {
    pub const ALL: [SerializationMode; 8] = [
        SerializationMode::Object,
        SerializationMode::VersionTolerant,
        SerializationMode::CircularReference,
        SerializationMode::Polymorphic,
        SerializationMode::Streaming,
        SerializationMode::Full,
        SerializationMode::Compact,
        SerializationMode::Debug,
    ];

    pub fn capabilities(self) -> Capabilities {
        let none = Capabilities::default();
        match self {
            SerializationMode::Object => none,
            SerializationMode::VersionTolerant => Capabilities {
                keyed: true,
                ..none
            },
            SerializationMode::CircularReference => Capabilities {
                references: true,
                ..none
            },
            SerializationMode::Polymorphic => Capabilities {
                type_tags: true,
                ..none
            },
            SerializationMode::Streaming => Capabilities {
                streaming: true,
                ..none
            },
            SerializationMode::Full => Capabilities {
                keyed: true,
                references: true,
                type_tags: true,
                ..none
            },
            SerializationMode::Compact => Capabilities {
                bit_packed: true,
                ..none
            },
            SerializationMode::Debug => Capabilities {
                keyed: true,
                references: true,
                type_tags: true,
                debug_info: true,
                ..none
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SerializationMode::Object => "Object",
            SerializationMode::VersionTolerant => "VersionTolerant",
            SerializationMode::CircularReference => "CircularReference",
            SerializationMode::Polymorphic => "Polymorphic",
            SerializationMode::Streaming => "Streaming",
            SerializationMode::Full => "Full",
            SerializationMode::Compact => "Compact",
            SerializationMode::Debug => "Debug",
        }
    }
}

/// Member layout inside an object body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Layout {
    /// Members in declaration order, no keys.
    #[default]
    Sequential,
    /// Key-prefixed members, regardless of mode.
    KeyValue,
}

/// Wire capabilities active for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities {
    pub keyed: bool,
    pub references: bool,
    pub type_tags: bool,
    pub streaming: bool,
    pub bit_packed: bool,
    pub debug_info: bool,
}

impl Capabilities {
    /// Capabilities for `mode` with `layout` applied on top.
    pub fn resolve(mode: SerializationMode, layout: Layout) -> Self {
        let mut caps = mode.capabilities();
        if layout == Layout::KeyValue {
            caps.keyed = true;
        }
        caps
    }

    pub fn to_flags(self) -> HeaderFlags {
        let mut flags = HeaderFlags::empty();
        flags.set(HeaderFlags::VERSION_TOLERANT, self.keyed);
        flags.set(HeaderFlags::CIRCULAR_REFERENCE, self.references);
        flags.set(HeaderFlags::POLYMORPHIC, self.type_tags);
        flags.set(HeaderFlags::STREAMING, self.streaming);
        flags.set(HeaderFlags::BIT_PACKED, self.bit_packed);
        flags.set(HeaderFlags::DEBUG_INFO, self.debug_info);
        flags
    }

    pub fn from_flags(flags: HeaderFlags) -> Self {
        Self {
            keyed: flags.contains(HeaderFlags::VERSION_TOLERANT),
            references: flags.contains(HeaderFlags::CIRCULAR_REFERENCE),
            type_tags: flags.contains(HeaderFlags::POLYMORPHIC),
            streaming: flags.contains(HeaderFlags::STREAMING),
            bit_packed: flags.contains(HeaderFlags::BIT_PACKED),
            debug_info: flags.contains(HeaderFlags::DEBUG_INFO),
        }
    }

    /// Capabilities that change how an object graph is shaped on the wire. Bit-packing
    /// and debug info only change how individual fields are spelled, so a decoder
    /// follows the header for those.
    pub fn structural(self) -> (bool, bool, bool, bool) {
        (self.keyed, self.references, self.type_tags, self.streaming)
    }

    pub fn structurally_matches(self, other: Capabilities) -> bool {
        self.structural() == other.structural()
    }
}
