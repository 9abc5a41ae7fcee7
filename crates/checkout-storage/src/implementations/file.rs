//! File-based storage backend.
//!
//! Persists each record as one file under a root directory. Composite keys
//! are percent-encoded into file names, so the on-disk layout stays
//! readable and collision-free. The condition-not-exists put maps onto an
//! O_EXCL create, which makes the existence check atomic at the
//! filesystem level.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File storage implementation rooted at a single directory.
pub struct FileStorage {
	root: PathBuf,
}

impl FileStorage {
	/// Creates the backend, making sure the root directory exists.
	pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
		let root = root.as_ref().to_path_buf();
		std::fs::create_dir_all(&root)
			.map_err(|e| StorageError::Backend(format!("failed to create {:?}: {}", root, e)))?;
		Ok(Self { root })
	}

	fn path_for(&self, key: &str) -> PathBuf {
		let mut name = String::with_capacity(key.len());
		for byte in key.bytes() {
			match byte {
				b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
					name.push(byte as char)
				}
				other => name.push_str(&format!("%{:02x}", other)),
			}
		}
		self.root.join(name)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.path_for(key)).await {
			Ok(bytes) => Ok(bytes),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		fs::write(self.path_for(key), value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn set_bytes_if_absent(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut file = match fs::OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(self.path_for(key))
			.await
		{
			Ok(file) => file,
			Err(e) if e.kind() == ErrorKind::AlreadyExists => {
				return Err(StorageError::AlreadyExists)
			}
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		file.write_all(&value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(fs::try_exists(self.path_for(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.path_for(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}
}
