//! In-process storage service.
//!
//! `MiniDfs` keeps the namespace (directories and file inodes) in memory and the
//! file contents as block files under its data directory, spread across the
//! configured number of data nodes. The on-disk layout mirrors a classic test
//! build tree so the fixture can discover its artifact directories from it:
//!
//! ```text
//! <base>/build/test/data/dfs/name
//! <base>/build/test/data/dfs/data/data1/current/blk_<uuid>
//! <base>/build/test/data/dfs/data/data2/current/blk_<uuid>
//! ```

use super::types::*;
use crate::config::{ClusterConfiguration, KEY_LOG_DIR, KEY_USER_NAME};
use crate::error::StorageError;

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub const SCHEME: &str = "dfs";
const NAMENODE_LOG: &str = "dfs-namenode.log";

#[derive(Debug, Clone)]
enum Inode {
    Directory,
    File { block: PathBuf, len: u64 },
}

pub struct MiniDfs {
    /// Absolute path string -> inode. Ordered so listings come out sorted by name.
    namespace: RwLock<BTreeMap<String, Inode>>,
    name_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: Option<PathBuf>,
    working_dir: ClusterPath,
    data_nodes: usize,
    next_node: AtomicUsize,
    address: SocketAddr,
    /// Holds the name endpoint's port for the service's lifetime.
    listener: Mutex<Option<TcpListener>>,
    running: AtomicBool,
}

impl MiniDfs {
    /// Lays out the working directories under `base_dir` and brings the service up.
    pub fn start(
        base_dir: &Path,
        configuration: &ClusterConfiguration,
        data_nodes: usize,
    ) -> Result<Arc<Self>> {
        let data_nodes = data_nodes.max(1);
        let dfs_dir = base_dir.join("build").join("test").join("data").join("dfs");
        let name_dir = dfs_dir.join("name");
        let data_dir = dfs_dir.join("data");

        std::fs::create_dir_all(&name_dir)
            .with_context(|| format!("creating name directory {}", name_dir.display()))?;
        for node in 1..=data_nodes {
            let current = data_dir.join(format!("data{}", node)).join("current");
            std::fs::create_dir_all(&current)
                .with_context(|| format!("creating data directory {}", current.display()))?;
        }

        let log_dir = configuration.get(KEY_LOG_DIR).map(PathBuf::from);
        if let Some(dir) = &log_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
        }

        let listener = TcpListener::bind("127.0.0.1:0").context("binding name endpoint")?;
        let address = listener.local_addr()?;

        let user = configuration
            .get(KEY_USER_NAME)
            .map(str::to_string)
            .unwrap_or_else(whoami::username);
        let working_dir = ClusterPath::root().join("user").join(user);

        let mut namespace = BTreeMap::new();
        namespace.insert("/".to_string(), Inode::Directory);

        let dfs = Arc::new(Self {
            namespace: RwLock::new(namespace),
            name_dir,
            data_dir,
            log_dir,
            working_dir,
            data_nodes,
            next_node: AtomicUsize::new(0),
            address,
            listener: Mutex::new(Some(listener)),
            running: AtomicBool::new(true),
        });

        dfs.mkdirs(&dfs.working_dir.clone())?;
        dfs.log(&format!(
            "namenode up at {} with {} data node(s)",
            dfs.address, dfs.data_nodes
        ));

        tracing::info!(
            "Storage service started at {} ({} data nodes, working dir {})",
            dfs.uri(),
            dfs.data_nodes,
            dfs.working_dir
        );

        Ok(dfs)
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn name_directory(&self) -> &Path {
        &self.name_dir
    }

    pub fn working_directory(&self) -> &ClusterPath {
        &self.working_dir
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.namespace
            .read()
            .values()
            .filter(|inode| matches!(inode, Inode::File { .. }))
            .count()
    }

    fn ensure_running(&self) -> Result<(), StorageError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }

    fn log(&self, line: &str) {
        let Some(dir) = &self.log_dir else {
            return;
        };
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(NAMENODE_LOG))
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = written {
            tracing::debug!("Failed to write namenode log: {}", e);
        }
    }

    fn next_block_path(&self) -> PathBuf {
        let node = self.next_node.fetch_add(1, Ordering::Relaxed) % self.data_nodes + 1;
        self.data_dir
            .join(format!("data{}", node))
            .join("current")
            .join(format!("blk_{}", Uuid::new_v4().simple()))
    }

    /// Creates `path` and missing ancestors while the namespace write lock is held.
    fn mkdirs_locked(
        namespace: &mut BTreeMap<String, Inode>,
        path: &ClusterPath,
    ) -> Result<(), StorageError> {
        let mut missing = Vec::new();
        let mut cursor = Some(path.clone());

        while let Some(current) = cursor {
            match namespace.get(current.as_str()) {
                Some(Inode::Directory) => break,
                Some(Inode::File { .. }) if &current == path => {
                    return Err(StorageError::NotADirectory { path: current });
                }
                Some(Inode::File { .. }) => {
                    return Err(StorageError::ParentIsFile { parent: current });
                }
                None => {
                    cursor = current.parent();
                    missing.push(current);
                }
            }
        }

        for dir in missing.into_iter().rev() {
            namespace.insert(dir.as_str().to_string(), Inode::Directory);
        }
        Ok(())
    }

    /// Points `path` at a freshly written block, replacing any previous file.
    fn commit_block(
        &self,
        path: &ClusterPath,
        write_block: impl FnOnce(&Path) -> std::io::Result<u64>,
    ) -> Result<(), StorageError> {
        self.ensure_running()?;
        let path = self.qualify(path);
        let mut namespace = self.namespace.write();

        if let Some(Inode::Directory) = namespace.get(path.as_str()) {
            return Err(StorageError::IsADirectory { path });
        }
        if let Some(parent) = path.parent() {
            Self::mkdirs_locked(&mut namespace, &parent)?;
        }

        let block = self.next_block_path();
        let len = write_block(&block)?;

        let previous = namespace.insert(
            path.as_str().to_string(),
            Inode::File {
                block: block.clone(),
                len,
            },
        );
        drop(namespace);

        if let Some(Inode::File { block: old, .. }) = previous
            && let Err(e) = std::fs::remove_file(&old)
        {
            tracing::debug!("Failed to drop replaced block {}: {}", old.display(), e);
        }

        tracing::debug!("Stored {} ({} bytes) in {}", path, len, block.display());
        Ok(())
    }
}

impl StorageService for MiniDfs {
    fn uri(&self) -> String {
        format!("{}://{}", SCHEME, self.address)
    }

    fn data_directory(&self) -> PathBuf {
        self.data_dir.clone()
    }

    fn exists(&self, path: &ClusterPath) -> Result<bool, StorageError> {
        self.ensure_running()?;
        let path = self.qualify(path);
        Ok(self.namespace.read().contains_key(path.as_str()))
    }

    fn is_file(&self, path: &ClusterPath) -> Result<bool, StorageError> {
        self.ensure_running()?;
        let path = self.qualify(path);
        Ok(matches!(
            self.namespace.read().get(path.as_str()),
            Some(Inode::File { .. })
        ))
    }

    fn list_children(&self, path: &ClusterPath) -> Result<Vec<FileStatus>, StorageError> {
        self.ensure_running()?;
        let path = self.qualify(path);
        let namespace = self.namespace.read();

        match namespace.get(path.as_str()) {
            None => return Err(StorageError::NotFound { path }),
            Some(Inode::File { len, .. }) => {
                return Ok(vec![FileStatus {
                    path,
                    is_dir: false,
                    len: *len,
                }]);
            }
            Some(Inode::Directory) => {}
        }

        let prefix = if path.is_root() {
            "/".to_string()
        } else {
            format!("{}/", path)
        };

        let children = namespace
            .range::<str, _>((Bound::Excluded(prefix.as_str()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains(SEPARATOR))
            .map(|(key, inode)| match inode {
                Inode::Directory => FileStatus {
                    path: ClusterPath::new(key),
                    is_dir: true,
                    len: 0,
                },
                Inode::File { len, .. } => FileStatus {
                    path: ClusterPath::new(key),
                    is_dir: false,
                    len: *len,
                },
            })
            .collect();

        Ok(children)
    }

    fn mkdirs(&self, path: &ClusterPath) -> Result<(), StorageError> {
        self.ensure_running()?;
        let path = self.qualify(path);
        let mut namespace = self.namespace.write();
        Self::mkdirs_locked(&mut namespace, &path)
    }

    fn copy_from_local(&self, local: &Path, remote: &ClusterPath) -> Result<(), StorageError> {
        if local.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is a directory", local.display()),
            )));
        }
        self.commit_block(remote, |block| std::fs::copy(local, block))
    }

    fn create(&self, path: &ClusterPath, data: &[u8]) -> Result<(), StorageError> {
        self.commit_block(path, |block| {
            std::fs::write(block, data)?;
            Ok(data.len() as u64)
        })
    }

    fn open(&self, path: &ClusterPath) -> Result<Box<dyn Read + Send>, StorageError> {
        self.ensure_running()?;
        let path = self.qualify(path);
        let block = match self.namespace.read().get(path.as_str()) {
            None => return Err(StorageError::NotFound { path }),
            Some(Inode::Directory) => return Err(StorageError::IsADirectory { path }),
            Some(Inode::File { block, .. }) => block.clone(),
        };
        Ok(Box::new(File::open(block)?))
    }

    fn qualify(&self, path: &ClusterPath) -> ClusterPath {
        if path.is_absolute() {
            path.clone()
        } else {
            self.working_dir.join(path.as_str())
        }
    }

    fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            tracing::debug!("Storage service already shut down");
            return Ok(());
        }
        self.listener.lock().take();
        self.log("namenode shut down");
        tracing::info!("Storage service at {} shut down", self.address);
        Ok(())
    }
}
