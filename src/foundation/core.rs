use std::fmt;

/// Status code returned by a native decode backend.
///
/// Negative codes are failures. Non-negative codes (including `S_FALSE`) count as success.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Hresult(pub i32);

impl Hresult {
    /// Operation succeeded.
    pub const S_OK: Self = Self(0);
    /// Operation succeeded with a non-default outcome.
    pub const S_FALSE: Self = Self(1);
    /// The decode pipeline has not drained yet; try again later.
    pub const E_PENDING: Self = Self(0x8000_000A_u32 as i32);
    /// Unspecified failure.
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    /// An argument did not match what the backend expects.
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);

    /// Return `true` for failure codes.
    pub fn failed(self) -> bool {
        self.0 < 0
    }

    /// Map a status code to `Ok(())` or `Err(self)`.
    pub fn to_result(self) -> Result<(), Hresult> {
        if self.failed() { Err(self) } else { Ok(()) }
    }
}

impl fmt::Display for Hresult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0 as u32)
    }
}

/// Decode buffer types understood by both backends.
///
/// The discriminants are the wire codes both native APIs use.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum BufferType {
    /// Picture parameters for the frame.
    PictureParameters = 0,
    /// Per-macroblock control data.
    MacroblockControl = 1,
    /// Residual difference data.
    ResidualDifference = 2,
    /// Deblocking filter control.
    DeblockingControl = 3,
    /// Inverse quantization matrices.
    InverseQuantizationMatrix = 4,
    /// Slice control records.
    SliceControl = 5,
    /// Compressed bitstream data.
    Bitstream = 6,
    /// Motion vectors.
    MotionVector = 7,
    /// Film grain synthesis parameters.
    FilmGrain = 8,
}

impl BufferType {
    const ALL: [Self; 9] = [
        Self::PictureParameters,
        Self::MacroblockControl,
        Self::ResidualDifference,
        Self::DeblockingControl,
        Self::InverseQuantizationMatrix,
        Self::SliceControl,
        Self::Bitstream,
        Self::MotionVector,
        Self::FilmGrain,
    ];

    /// Native wire code for this buffer type.
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Look up a buffer type by its native wire code.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    fn name(self) -> &'static str {
        match self {
            Self::PictureParameters => "picture parameters",
            Self::MacroblockControl => "macroblock control",
            Self::ResidualDifference => "residual difference",
            Self::DeblockingControl => "deblocking control",
            Self::InverseQuantizationMatrix => "inverse quantization matrix",
            Self::SliceControl => "slice control",
            Self::Bitstream => "bitstream",
            Self::MotionVector => "motion vector",
            Self::FilmGrain => "film grain",
        }
    }
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_raw())
    }
}

/// Opaque handle to a decode surface owned by the backend.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Surface(u64);

impl Surface {
    /// Wrap a raw native surface handle.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw native surface handle.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// The caller's decoded-frame object. Carries the surface the frame decodes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Target surface for the decode.
    pub surface: Surface,
}

impl DecodedFrame {
    /// Create a frame targeting `surface`.
    pub fn new(surface: Surface) -> Self {
        Self { surface }
    }
}

/// Opaque native decoder handle passed along with every video-context call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DecoderHandle(pub u64);

/// The two supported decode backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Surfaces addressed by index into a fixed pool.
    PoolIndexed,
    /// Surfaces addressed by texture-array slice, with an optional cross-thread lock.
    ArraySlice,
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
