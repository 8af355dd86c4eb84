//! Directories and small files stored as single pages, addressed by the
//! integer inode keys the core index maps to page ids. Every operation
//! here goes through [`IndexFile`]'s Core API or direct page access;
//! nothing in this module touches the tree, allocator, or buffer pool
//! directly.

use crate::error::{Error, Result};
use crate::index::IndexFile;
use crate::page::{BlockId, PAGE_SIZE};
use tracing::error;

// Object header: key:u64(8) + block:u64(8) + kind:u8(1).
const HEADER_SIZE: usize = 17;
const SIZE_FIELD: usize = 8;
const DATA_OFFSET: usize = HEADER_SIZE + SIZE_FIELD;

pub const MAX_FILE_DATA: usize = PAGE_SIZE - DATA_OFFSET;
pub const MAX_DIR_DATA: usize = PAGE_SIZE - DATA_OFFSET;

const DIR_ENTRY_HEADER: usize = 8 + 1 + 2; // inode + kind + name_len

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Unknown = 0,
    Directory = 1,
    File = 2,
}

impl ObjectKind {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(ObjectKind::Unknown),
            1 => Ok(ObjectKind::Directory),
            2 => Ok(ObjectKind::File),
            other => {
                error!(tag = other, "unknown object kind tag");
                Err(Error::CorruptNode(format!(
                    "unknown object kind tag {}",
                    other
                )))
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct DirEntry {
    pub inode: u64,
    pub kind: ObjectKind,
    pub name: String,
}

fn read_size(bytes: &[u8]) -> usize {
    u64::from_le_bytes(bytes[HEADER_SIZE..DATA_OFFSET].try_into().unwrap()) as usize
}

fn write_size(bytes: &mut [u8], size: usize) {
    bytes[HEADER_SIZE..DATA_OFFSET].copy_from_slice(&(size as u64).to_le_bytes());
}

fn write_header(bytes: &mut [u8], key: u64, block: BlockId, kind: ObjectKind) {
    bytes[0..8].copy_from_slice(&key.to_le_bytes());
    bytes[8..16].copy_from_slice(&block.to_le_bytes());
    bytes[16] = kind as u8;
    write_size(bytes, 0);
}

/// Thin adapter over [`IndexFile`] exposing directories and small files.
pub struct ObjectStore<'a> {
    index: &'a IndexFile,
}

impl<'a> ObjectStore<'a> {
    pub const ROOT_INODE: u64 = 0;

    pub fn new(index: &'a IndexFile) -> Self {
        Self { index }
    }

    pub fn create_root_directory(&self) -> Result<()> {
        let handle = self.index.allocate_page()?;
        let handle_id = handle.id();
        {
            let mut page = handle.data_mut();
            write_header(page.bytes_mut(), Self::ROOT_INODE, handle_id, ObjectKind::Directory);
        }
        self.index.insert(Self::ROOT_INODE, handle_id)?;
        Ok(())
    }

    fn add_object(&self, parent_key: u64, name: &str, kind: ObjectKind) -> Result<Option<u64>> {
        let parent_page_id = match self.index.lookup(parent_key)? {
            Some(id) => id,
            None => return Ok(None),
        };

        let new_key = self.index.next_key()?;
        let handle = self.index.allocate_page()?;
        let handle_id = handle.id();
        {
            let mut page = handle.data_mut();
            write_header(page.bytes_mut(), new_key, handle_id, kind);
        }

        self.append_dir_entry(parent_page_id, new_key, kind, name)?;
        self.index.insert(new_key, handle_id)?;
        Ok(Some(new_key))
    }

    pub fn add_directory(&self, parent_key: u64, name: &str) -> Result<Option<u64>> {
        self.add_object(parent_key, name, ObjectKind::Directory)
    }

    pub fn add_file(&self, parent_key: u64, name: &str) -> Result<Option<u64>> {
        self.add_object(parent_key, name, ObjectKind::File)
    }

    fn append_dir_entry(
        &self,
        dir_page_id: BlockId,
        inode: u64,
        kind: ObjectKind,
        name: &str,
    ) -> Result<()> {
        let handle = self.index.load_page(dir_page_id)?;
        let mut page = handle.data_mut();
        let bytes = page.bytes_mut();
        let size = read_size(bytes);
        let entry_len = DIR_ENTRY_HEADER + name.len();
        if size + entry_len > MAX_DIR_DATA {
            return Err(Error::OutOfPage {
                offset: DATA_OFFSET + size,
                len: entry_len,
            });
        }
        let off = DATA_OFFSET + size;
        bytes[off..off + 8].copy_from_slice(&inode.to_le_bytes());
        bytes[off + 8] = kind as u8;
        bytes[off + 9..off + 11].copy_from_slice(&(name.len() as u16).to_le_bytes());
        bytes[off + 11..off + 11 + name.len()].copy_from_slice(name.as_bytes());
        write_size(bytes, size + entry_len);
        Ok(())
    }

    pub fn list_directory(&self, key: u64) -> Result<Vec<DirEntry>> {
        let page_id = self.lookup_page(key)?;
        let handle = self.index.load_page(page_id)?;
        let page = handle.data();
        let bytes = page.bytes();
        let size = read_size(bytes);

        let mut entries = Vec::new();
        let mut off = DATA_OFFSET;
        let end = DATA_OFFSET + size;
        while off < end {
            let inode = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
            let kind = ObjectKind::from_u8(bytes[off + 8])?;
            let name_len = u16::from_le_bytes(bytes[off + 9..off + 11].try_into().unwrap()) as usize;
            let name = String::from_utf8_lossy(&bytes[off + 11..off + 11 + name_len]).into_owned();
            entries.push(DirEntry { inode, kind, name });
            off += DIR_ENTRY_HEADER + name_len;
        }
        Ok(entries)
    }

    pub fn lookup_in_directory(&self, key: u64, name: &str) -> Result<Option<u64>> {
        Ok(self
            .list_directory(key)?
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| e.inode))
    }

    fn lookup_page(&self, key: u64) -> Result<BlockId> {
        self.index.lookup(key)?.ok_or_else(|| {
            error!(key, "no object for key");
            Error::CorruptNode(format!("no object for key {}", key))
        })
    }

    pub fn write_file(&self, key: u64, data: &[u8], pos: usize) -> Result<()> {
        if pos + data.len() > MAX_FILE_DATA {
            return Err(Error::OutOfPage {
                offset: pos,
                len: data.len(),
            });
        }
        let page_id = self.lookup_page(key)?;
        let handle = self.index.load_page(page_id)?;
        let mut page = handle.data_mut();
        let bytes = page.bytes_mut();
        bytes[DATA_OFFSET + pos..DATA_OFFSET + pos + data.len()].copy_from_slice(data);
        let new_size = (pos + data.len()).max(read_size(bytes));
        write_size(bytes, new_size);
        Ok(())
    }

    pub fn append_file(&self, key: u64, data: &[u8]) -> Result<()> {
        let page_id = self.lookup_page(key)?;
        let size = {
            let handle = self.index.load_page(page_id)?;
            let page = handle.data();
            read_size(page.bytes())
        };
        self.write_file(key, data, size)
    }

    pub fn read_file(&self, key: u64) -> Result<Vec<u8>> {
        let page_id = self.lookup_page(key)?;
        let handle = self.index.load_page(page_id)?;
        let page = handle.data();
        let bytes = page.bytes();
        let size = read_size(bytes);
        Ok(bytes[DATA_OFFSET..DATA_OFFSET + size].to_vec())
    }

    pub fn remove_object(&self, key: u64, parent_key: u64) -> Result<()> {
        let page_id = match self.index.remove(key)? {
            Some(id) => id,
            None => return Ok(()),
        };
        self.index.free_page(page_id)?;
        self.remove_dir_entry(parent_key, key)
    }

    fn remove_dir_entry(&self, parent_key: u64, inode: u64) -> Result<()> {
        let parent_page_id = self.lookup_page(parent_key)?;
        let handle = self.index.load_page(parent_page_id)?;
        let mut page = handle.data_mut();
        let bytes = page.bytes_mut();
        let size = read_size(bytes);

        let mut kept = Vec::new();
        let mut off = DATA_OFFSET;
        let end = DATA_OFFSET + size;
        while off < end {
            let e_inode = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
            let kind = bytes[off + 8];
            let name_len = u16::from_le_bytes(bytes[off + 9..off + 11].try_into().unwrap()) as usize;
            let name = bytes[off + 11..off + 11 + name_len].to_vec();
            if e_inode != inode {
                kept.push((e_inode, kind, name));
            }
            off += DIR_ENTRY_HEADER + name_len;
        }

        let mut write_off = DATA_OFFSET;
        for (e_inode, kind, name) in &kept {
            bytes[write_off..write_off + 8].copy_from_slice(&e_inode.to_le_bytes());
            bytes[write_off + 8] = *kind;
            bytes[write_off + 9..write_off + 11].copy_from_slice(&(name.len() as u16).to_le_bytes());
            bytes[write_off + 11..write_off + 11 + name.len()].copy_from_slice(name);
            write_off += DIR_ENTRY_HEADER + name.len();
        }
        write_size(bytes, write_off - DATA_OFFSET);
        Ok(())
    }
}
