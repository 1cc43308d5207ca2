use crate::foundation::core::BufferType;

/// Maximum number of descriptors one frame submits.
pub const MAX_FRAME_BUFFERS: usize = 4;

/// Buffer descriptor layout of the pool-indexed backend.
///
/// Everything but the type, size and macroblock count stays zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dxva2BufferDesc {
    /// Buffer type wire code.
    pub compressed_buffer_type: u32,
    /// Reserved, zero.
    pub buffer_index: u32,
    /// Offset of the payload inside the slot.
    pub data_offset: u32,
    /// Payload size in bytes.
    pub data_size: u32,
    /// First macroblock covered by the buffer.
    pub first_mb_in_buffer: u32,
    /// Number of macroblocks covered by the buffer.
    pub num_mbs_in_buffer: u32,
    /// Reserved, zero.
    pub width: u32,
    /// Reserved, zero.
    pub height: u32,
    /// Reserved, zero.
    pub stride: u32,
    /// Reserved, zero.
    pub reserved_bits: u32,
    /// Protected-video-path state, unused.
    pub pvp_state: u64,
}

/// Encryption block layout carried by [`D3d11BufferDesc`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncryptedBlockInfo {
    /// Clear bytes at the start of the buffer.
    pub num_encrypted_bytes_at_beginning: u32,
    /// Bytes in the skip pattern.
    pub num_bytes_in_skip_pattern: u32,
    /// Bytes in the encrypt pattern.
    pub num_bytes_in_encrypt_pattern: u32,
}

/// Buffer descriptor layout of the array-slice backend.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct D3d11BufferDesc {
    /// Buffer type wire code.
    pub buffer_type: u32,
    /// Reserved, zero.
    pub buffer_index: u32,
    /// Offset of the payload inside the slot.
    pub data_offset: u32,
    /// Payload size in bytes.
    pub data_size: u32,
    /// First macroblock covered by the buffer.
    pub first_mb_in_buffer: u32,
    /// Number of macroblocks covered by the buffer.
    pub num_mbs_in_buffer: u32,
    /// Reserved, zero.
    pub width: u32,
    /// Reserved, zero.
    pub height: u32,
    /// Reserved, zero.
    pub stride: u32,
    /// Reserved, zero.
    pub reserved_bits: u32,
    /// Initialization vector pointer, unused.
    pub iv: u64,
    /// Initialization vector size, unused.
    pub iv_size: u32,
    /// Partial encryption flag, unused.
    pub partial_encryption: i32,
    /// Encryption block info, unused.
    pub encrypted_block_info: EncryptedBlockInfo,
}

/// One committed buffer in the layout of the active backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferDescriptor {
    /// Pool-indexed backend layout.
    Pool(Dxva2BufferDesc),
    /// Array-slice backend layout.
    Slice(D3d11BufferDesc),
}

impl BufferDescriptor {
    /// Zeroed pool-indexed descriptor with type, size and macroblock count set.
    pub fn pool(buffer_type: BufferType, data_size: u32, mb_count: u32) -> Self {
        Self::Pool(Dxva2BufferDesc {
            compressed_buffer_type: buffer_type.as_raw(),
            data_size,
            num_mbs_in_buffer: mb_count,
            ..Default::default()
        })
    }

    /// Zeroed array-slice descriptor with type, size and macroblock count set.
    pub fn slice(buffer_type: BufferType, data_size: u32, mb_count: u32) -> Self {
        Self::Slice(D3d11BufferDesc {
            buffer_type: buffer_type.as_raw(),
            data_size,
            num_mbs_in_buffer: mb_count,
            ..Default::default()
        })
    }

    /// Buffer type, if the stored wire code is a known one.
    pub fn buffer_type(&self) -> Option<BufferType> {
        let raw = match self {
            Self::Pool(d) => d.compressed_buffer_type,
            Self::Slice(d) => d.buffer_type,
        };
        BufferType::from_raw(raw)
    }

    /// Payload size in bytes.
    pub fn data_size(&self) -> u32 {
        match self {
            Self::Pool(d) => d.data_size,
            Self::Slice(d) => d.data_size,
        }
    }

    /// Macroblock count.
    pub fn mb_count(&self) -> u32 {
        match self {
            Self::Pool(d) => d.num_mbs_in_buffer,
            Self::Slice(d) => d.num_mbs_in_buffer,
        }
    }
}
