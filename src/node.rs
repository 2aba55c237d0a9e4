use crate::fs::{MAX_NAME_LEN, NUM_BLOCK_POINTERS};
use crate::io::BlockNumber;

use zerocopy::{AsBytes, FromBytes};

/// Size in bytes of one serialized inode record.
pub const INODE_RECORD_SIZE: usize = core::mem::size_of::<RawInode>();

/// Per-file metadata: the name binding, the content length, and the ordered
/// direct block pointers. A slot with no name is unused. Pointers are filled
/// contiguously from index 0; the first `None` ends the list.
#[derive(Debug, Clone, PartialEq)]
pub struct Inode {
    name: Option<String>,
    size: Option<u32>,
    blocks: [Option<BlockNumber>; NUM_BLOCK_POINTERS],
}

impl Inode {
    /// An unused slot: no name, no size, no pointers.
    pub fn empty() -> Self {
        Self {
            name: None,
            size: None,
            blocks: [None; NUM_BLOCK_POINTERS],
        }
    }

    /// A freshly created file: name bound, nothing written yet.
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            size: None,
            blocks: [None; NUM_BLOCK_POINTERS],
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn size(&self) -> Option<u32> {
        self.size
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = Some(size);
    }

    pub fn block_pointer(&self, slot: usize) -> Option<BlockNumber> {
        self.blocks[slot]
    }

    pub fn set_block_pointer(&mut self, slot: usize, blocknr: BlockNumber) {
        self.blocks[slot] = Some(blocknr);
    }

    /// Walks the pointer list in order, stopping at the first unused slot.
    pub fn block_pointers(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.blocks.iter().map_while(|blocknr| *blocknr)
    }

    /// Whether any data blocks have been allocated to this file. Allocation
    /// fills pointers from slot 0, so checking the first is enough.
    pub fn has_blocks(&self) -> bool {
        self.blocks[0].is_some()
    }

    pub fn block_count(&self) -> usize {
        self.block_pointers().count()
    }

    pub fn is_unused(&self) -> bool {
        self.name.is_none()
    }
}

/// On-device form of an [`Inode`]. A zero-filled name marks the slot unused;
/// -1 marks an unset size or pointer. This structure __must not exceed the
/// device's inode slot size.__
#[repr(C)]
#[derive(AsBytes, FromBytes, Clone, Copy)]
pub struct RawInode {
    /// File name bytes, zero-padded to the field width.
    name: [u8; MAX_NAME_LEN],
    /// Content length in bytes, or -1 before the first write.
    size: i32,
    /// Direct data block pointers, -1 where unused.
    blocks: [i32; NUM_BLOCK_POINTERS],
}

impl RawInode {
    fn unused() -> Self {
        Self {
            name: [0; MAX_NAME_LEN],
            size: -1,
            blocks: [-1; NUM_BLOCK_POINTERS],
        }
    }

    /// Reads a record back from a buffer of at least `INODE_RECORD_SIZE`
    /// bytes. Passing a shorter slice will result in a panic.
    pub fn parse(buf: &[u8]) -> Self {
        let mut raw = Self::unused();
        raw.as_bytes_mut().copy_from_slice(&buf[..INODE_RECORD_SIZE]);
        raw
    }

    pub fn serialize(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<&Inode> for RawInode {
    fn from(inode: &Inode) -> Self {
        let mut raw = Self::unused();
        if let Some(name) = inode.name() {
            raw.name[..name.len()].copy_from_slice(name.as_bytes());
        }
        if let Some(size) = inode.size() {
            raw.size = size as i32;
        }
        for (slot, blocknr) in inode.blocks.iter().enumerate() {
            if let Some(blocknr) = blocknr {
                raw.blocks[slot] = *blocknr as i32;
            }
        }
        raw
    }
}

impl From<&RawInode> for Inode {
    fn from(raw: &RawInode) -> Self {
        let len = raw.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        if len == 0 {
            // A nameless slot is unused no matter what the rest of the
            // record holds; a freshly formatted device is all zeroes, not
            // sentinel values.
            return Inode::empty();
        }
        let name = Some(String::from_utf8_lossy(&raw.name[..len]).into_owned());

        let mut blocks = [None; NUM_BLOCK_POINTERS];
        for (slot, &blocknr) in raw.blocks.iter().enumerate() {
            if blocknr >= 0 {
                blocks[slot] = Some(blocknr as BlockNumber);
            }
        }

        Self {
            name,
            size: if raw.size >= 0 { Some(raw.size as u32) } else { None },
            blocks,
        }
    }
}
