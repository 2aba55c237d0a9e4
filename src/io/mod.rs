mod block;
mod diskemu;
mod memdisk;

pub use block::{BlockNumber, BlockStorage, InodeIndex};
pub use diskemu::{FileBlockEmulator, FileBlockEmulatorBuilder};
pub use memdisk::{
    MemBlockEmulator, MemBlockEmulatorBuilder, DEFAULT_BLOCK_COUNT, DEFAULT_INODE_COUNT,
};
