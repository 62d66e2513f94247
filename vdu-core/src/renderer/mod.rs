//! Renderer variants and selection.

pub mod selector;

pub use selector::{RendererSelector, RendererVariant, VariantLoader};

// ── RendererKind ─────────────────────────────────────────────────

/// The three decode/render tiers a device can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererKind {
    /// Image-blob tier: each payload is one complete compressed image.
    MotionJpeg,
    /// Hardware-accelerated bitstream tier.
    HardwareH264,
    /// Software bitstream tier.
    SoftwareH264,
}

impl RendererKind {
    /// Maps the device-advertised renderer identifier. Unknown ids
    /// fall back to the image tier, the variant every device supports.
    pub fn from_id(id: i32) -> Self {
        match id {
            1 => Self::HardwareH264,
            2 => Self::SoftwareH264,
            _ => Self::MotionJpeg,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            Self::MotionJpeg => 0,
            Self::HardwareH264 => 1,
            Self::SoftwareH264 => 2,
        }
    }

    pub fn framing(&self) -> PayloadFraming {
        match self {
            Self::MotionJpeg => PayloadFraming::Blob,
            Self::HardwareH264 | Self::SoftwareH264 => PayloadFraming::ByteStream,
        }
    }
}

impl std::fmt::Display for RendererKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MotionJpeg => write!(f, "Motion JPEG"),
            Self::HardwareH264 => write!(f, "h264 (hardware)"),
            Self::SoftwareH264 => write!(f, "h264 (software)"),
        }
    }
}

/// How payloads are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadFraming {
    /// Length-delimited, self-contained image blobs.
    Blob,
    /// Raw compressed byte stream; unit boundaries live inside the
    /// bytes themselves.
    ByteStream,
}

/// Identity of a decode/render variant. Compared across
/// renegotiations to detect when a session restart is unavoidable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererDescriptor {
    pub kind: RendererKind,
    pub framing: PayloadFraming,
}

impl RendererDescriptor {
    pub fn for_renderer_id(id: i32) -> Self {
        let kind = RendererKind::from_id(id);
        Self {
            kind,
            framing: kind.framing(),
        }
    }
}
