//! Physical layout of the Graphwire stream format.
//!
//! A stream is a 4-byte header (magic number and protocol version, both
//! big-endian `u16`) followed by a sequence of tagged values. Every value
//! production begins with a one-byte [`Tag`] drawn from a closed set; block-data
//! frames interleave freely with values at the top level and inside custom
//! object data.
//!
//! All multi-byte quantities in the stream are big-endian.

/// Magic number opening every stream.
pub const STREAM_MAGIC: u16 = 0xACED;

/// Protocol version written after the magic number.
pub const STREAM_VERSION: u16 = 5;

/// Offset added to handle indices when they appear on the wire as
/// back-references. The first assigned handle is written as `0x7E0000`.
pub const BASE_WIRE_HANDLE: i32 = 0x7E_0000;

/// Maximum payload of one block-data frame, and the size of the channel
/// buffers on both sides.
pub const MAX_BLOCK_SIZE: usize = 1024;

// --- TYPE TAGS ---

/// One-byte type tag opening every value production in the stream.
///
/// The set is closed: any other first byte is a format fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// A null value.
    Null = 0x70,
    /// Back-reference to an already-assigned handle (followed by a wire handle).
    Reference = 0x71,
    /// Inline class descriptor.
    ClassDesc = 0x72,
    /// Ordinary object.
    Object = 0x73,
    /// String whose encoding fits in an unsigned 16-bit length.
    String = 0x74,
    /// Array (primitive or reference elements).
    Array = 0x75,
    /// A class used as a first-class value.
    Class = 0x76,
    /// Block-data frame with a `u8` payload length.
    BlockData = 0x77,
    /// Terminator for the custom data of one object level.
    EndBlockData = 0x78,
    /// Handle-table reset marker.
    Reset = 0x79,
    /// Block-data frame with an `i32` payload length.
    BlockDataLong = 0x7A,
    /// In-band fatal failure marker, followed by the failure message string.
    Exception = 0x7B,
    /// String whose encoding exceeds 65535 bytes (8-byte length).
    LongString = 0x7C,
    /// Proxy class descriptor (interface-list form).
    ProxyClassDesc = 0x7D,
    /// Enum constant.
    Enum = 0x7E,
}

impl Tag {
    /// Decodes a raw stream byte into a tag, or `None` for bytes outside the
    /// closed set.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x70 => Some(Self::Null),
            0x71 => Some(Self::Reference),
            0x72 => Some(Self::ClassDesc),
            0x73 => Some(Self::Object),
            0x74 => Some(Self::String),
            0x75 => Some(Self::Array),
            0x76 => Some(Self::Class),
            0x77 => Some(Self::BlockData),
            0x78 => Some(Self::EndBlockData),
            0x79 => Some(Self::Reset),
            0x7A => Some(Self::BlockDataLong),
            0x7B => Some(Self::Exception),
            0x7C => Some(Self::LongString),
            0x7D => Some(Self::ProxyClassDesc),
            0x7E => Some(Self::Enum),
            _ => None,
        }
    }

    /// The raw stream byte for this tag.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

// --- CLASS DESCRIPTOR FLAG BITS ---

/// The class has a custom write hook; its serial data carries a framed custom
/// section terminated by [`Tag::EndBlockData`].
pub const SC_WRITE_METHOD: u8 = 0x01;

/// The class participates in default field serialization.
pub const SC_SERIALIZABLE: u8 = 0x02;

/// The class uses the externalizable protocol variant. Recognized on the wire
/// and rejected: Graphwire does not decode this variant and refuses to desync.
pub const SC_EXTERNALIZABLE: u8 = 0x04;

/// The descriptor describes an enum class.
pub const SC_ENUM: u8 = 0x10;
