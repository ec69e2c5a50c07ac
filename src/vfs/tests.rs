//! Virtual Filesystem Tests
//!
//! ## Test Scopes
//! - **Filter**: the hidden-path rule on leaf names.
//! - **Import**: byte-identical mirroring, directory-before-children ordering,
//!   overwrite and abort behavior (observed through a recording storage).
//! - **Traversal**: filtering, ordering, missing roots and early stop.
//! - **Lines**: per-file line order, failure propagation and reader release.

#[cfg(test)]
mod tests {
    use crate::config::{ClusterConfiguration, KEY_USER_NAME};
    use crate::error::{FixtureError, StorageError};
    use crate::storage::memory::MiniDfs;
    use crate::storage::types::{ClusterPath, FileStatus, StorageService};
    use crate::vfs::*;
    use parking_lot::Mutex;
    use std::io::Read;
    use std::ops::ControlFlow;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to a `MiniDfs` and records mutating calls and open readers.
    struct RecordingStorage {
        inner: Arc<MiniDfs>,
        calls: Mutex<Vec<String>>,
        open_readers: Arc<AtomicUsize>,
    }

    struct TrackedReader {
        inner: Box<dyn Read + Send>,
        open_readers: Arc<AtomicUsize>,
    }

    impl Read for TrackedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.open_readers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl RecordingStorage {
        fn new(base: &Path) -> Self {
            let mut conf = ClusterConfiguration::new();
            conf.set(KEY_USER_NAME, "tester");
            Self {
                inner: MiniDfs::start(base, &conf, 1).unwrap(),
                calls: Mutex::new(Vec::new()),
                open_readers: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, op: &str, path: &ClusterPath) {
            let qualified = self.inner.qualify(path);
            self.calls.lock().push(format!("{} {}", op, qualified));
        }
    }

    impl StorageService for RecordingStorage {
        fn uri(&self) -> String {
            self.inner.uri()
        }

        fn data_directory(&self) -> PathBuf {
            self.inner.data_directory()
        }

        fn exists(&self, path: &ClusterPath) -> Result<bool, StorageError> {
            self.inner.exists(path)
        }

        fn is_file(&self, path: &ClusterPath) -> Result<bool, StorageError> {
            self.inner.is_file(path)
        }

        fn list_children(&self, path: &ClusterPath) -> Result<Vec<FileStatus>, StorageError> {
            self.inner.list_children(path)
        }

        fn mkdirs(&self, path: &ClusterPath) -> Result<(), StorageError> {
            self.record("mkdirs", path);
            self.inner.mkdirs(path)
        }

        fn copy_from_local(&self, local: &Path, remote: &ClusterPath) -> Result<(), StorageError> {
            self.record("copy", remote);
            self.inner.copy_from_local(local, remote)
        }

        fn create(&self, path: &ClusterPath, data: &[u8]) -> Result<(), StorageError> {
            self.inner.create(path, data)
        }

        fn open(&self, path: &ClusterPath) -> Result<Box<dyn Read + Send>, StorageError> {
            self.record("open", path);
            let inner = self.inner.open(path)?;
            self.open_readers.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TrackedReader {
                inner,
                open_readers: self.open_readers.clone(),
            }))
        }

        fn qualify(&self, path: &ClusterPath) -> ClusterPath {
            self.inner.qualify(path)
        }

        fn shutdown(&self) -> anyhow::Result<()> {
            self.inner.shutdown()
        }
    }

    fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (relative, content) in files {
            let path = root.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    fn read_remote(storage: &dyn StorageService, path: &ClusterPath) -> Vec<u8> {
        let mut content = Vec::new();
        storage.open(path).unwrap().read_to_end(&mut content).unwrap();
        content
    }

    /// Seeds `files` under a fresh local root named `data` and imports it.
    fn seeded(files: &[(&str, &[u8])]) -> (tempfile::TempDir, RecordingStorage, ClusterPath) {
        let dir = tempfile::tempdir().unwrap();
        let local_root = dir.path().join("data");
        std::fs::create_dir_all(&local_root).unwrap();
        write_tree(&local_root, files);

        let storage = RecordingStorage::new(&dir.path().join("cluster"));
        let summary = import_tree(&storage, &local_root, &ClusterPath::new("data")).unwrap();
        (dir, storage, summary.root)
    }

    fn collect_recursive(storage: &dyn StorageService, root: &ClusterPath) -> Vec<String> {
        let mut seen = Vec::new();
        process_paths_recursive(storage, root, |status| {
            seen.push(status.path.to_string());
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
        seen
    }

    fn collect_lines_recursive(storage: &dyn StorageService, root: &ClusterPath) -> Vec<String> {
        let mut lines = Vec::new();
        process_data_recursive(storage, root, |line| {
            lines.push(line.to_string());
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
        lines
    }

    // ============================================================
    // FILTER
    // ============================================================

    #[test]
    fn test_hidden_checks_leaf_only() {
        assert!(is_hidden(&ClusterPath::new("/out/_SUCCESS")));
        assert!(is_hidden(&ClusterPath::new("_logs")));
        assert!(!is_hidden(&ClusterPath::new("/_tmp/part-00000")));
        assert!(!is_hidden(&ClusterPath::new("/out/part_1")));
        assert!(!is_hidden(&ClusterPath::root()));
    }

    // ============================================================
    // IMPORT
    // ============================================================

    #[test]
    fn test_import_is_byte_identical() {
        let binary: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let (_dir, storage, root) = seeded(&[
            ("a/b.txt", b"x\ny"),
            ("a/c/deep.bin", &binary),
            ("d.txt", b"w"),
            ("empty.txt", b""),
        ]);

        assert_eq!(root, ClusterPath::new("/user/tester/data"));
        assert_eq!(read_remote(&storage, &root.join("a/b.txt")), b"x\ny");
        assert_eq!(read_remote(&storage, &root.join("a/c/deep.bin")), binary);
        assert_eq!(read_remote(&storage, &root.join("d.txt")), b"w");
        assert_eq!(read_remote(&storage, &root.join("empty.txt")), b"");
    }

    #[test]
    fn test_import_creates_directories_before_children() {
        let (_dir, storage, _root) = seeded(&[("a/b.txt", b"1"), ("a/c/d.txt", b"2"), ("e.txt", b"3")]);

        assert_eq!(
            storage.calls(),
            vec![
                "mkdirs /user/tester/data",
                "mkdirs /user/tester/data/a",
                "copy /user/tester/data/a/b.txt",
                "mkdirs /user/tester/data/a/c",
                "copy /user/tester/data/a/c/d.txt",
                "copy /user/tester/data/e.txt",
            ]
        );
    }

    #[test]
    fn test_import_summary_counts() {
        let dir = tempfile::tempdir().unwrap();
        let local_root = dir.path().join("seed");
        write_tree(&local_root, &[("x/1.txt", b"12"), ("2.txt", b"345")]);
        let storage = RecordingStorage::new(&dir.path().join("cluster"));

        let summary = import_tree(&storage, &local_root, &ClusterPath::new("seed")).unwrap();

        assert_eq!(summary.directories, 2);
        assert_eq!(summary.files, 2);
        assert_eq!(summary.bytes, 5);
    }

    #[test]
    fn test_reimport_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let local_root = dir.path().join("data");
        write_tree(&local_root, &[("f.txt", b"old")]);
        let storage = RecordingStorage::new(&dir.path().join("cluster"));
        let remote = ClusterPath::new("data");

        import_tree(&storage, &local_root, &remote).unwrap();
        std::fs::write(local_root.join("f.txt"), b"new").unwrap();
        import_tree(&storage, &local_root, &remote).unwrap();

        assert_eq!(read_remote(&storage, &remote.join("f.txt")), b"new");
    }

    #[test]
    fn test_import_failure_keeps_earlier_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let local_root = dir.path().join("data");
        write_tree(&local_root, &[("a.txt", b"a"), ("b/c.txt", b"c"), ("d.txt", b"d")]);
        let storage = RecordingStorage::new(&dir.path().join("cluster"));
        // A file where directory `b` has to go.
        storage.create(&ClusterPath::new("data/b"), b"blocker").unwrap();

        let err = import_tree(&storage, &local_root, &ClusterPath::new("data")).unwrap_err();

        match err {
            FixtureError::Import { remote, source, .. } => {
                assert_eq!(remote, ClusterPath::new("data/b"));
                assert!(matches!(source, StorageError::NotADirectory { .. }));
            }
            other => panic!("expected import error, got {:?}", other),
        }
        assert!(storage.exists(&ClusterPath::new("data/a.txt")).unwrap());
        assert!(!storage.exists(&ClusterPath::new("data/d.txt")).unwrap());
    }

    #[test]
    fn test_import_missing_local_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RecordingStorage::new(&dir.path().join("cluster"));

        let err = import_tree(&storage, &dir.path().join("nope"), &ClusterPath::new("nope"))
            .unwrap_err();
        assert!(matches!(err, FixtureError::Import { .. }));
    }

    // ============================================================
    // TRAVERSAL
    // ============================================================

    #[test]
    fn test_process_paths_is_shallow_and_filtered() {
        let (_dir, storage, root) = seeded(&[
            ("a/b.txt", b"1"),
            ("_SUCCESS", b""),
            ("_logs/history", b"h"),
            ("d.txt", b"2"),
        ]);

        let mut seen = Vec::new();
        let flow = process_paths(&storage, &root, |status| {
            seen.push((status.path.name().to_string(), status.is_dir));
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();

        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(seen, vec![("a".to_string(), true), ("d.txt".to_string(), false)]);
    }

    #[test]
    fn test_missing_root_is_not_found_and_visits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = RecordingStorage::new(dir.path());
        let mut calls = 0;

        let err = process_paths(&storage, &ClusterPath::new("/nowhere"), |_| {
            calls += 1;
            Ok(ControlFlow::Continue(()))
        })
        .unwrap_err();
        assert!(err.is_path_not_found());

        let err = process_paths_recursive(&storage, &ClusterPath::new("/nowhere"), |_| {
            calls += 1;
            Ok(ControlFlow::Continue(()))
        })
        .unwrap_err();
        assert!(err.is_path_not_found());

        assert_eq!(calls, 0);
    }

    #[test]
    fn test_hidden_directory_subtree_is_never_visited() {
        let (_dir, storage, root) = seeded(&[("_skip/visible.txt", b"v"), ("kept.txt", b"k")]);

        let seen = collect_recursive(&storage, &root);

        assert_eq!(seen, vec![root.join("kept.txt").to_string()]);
        assert!(seen.iter().all(|p| !p.ends_with("visible.txt")));
    }

    #[test]
    fn test_recursive_walk_is_depth_first_in_listing_order() {
        let (_dir, storage, root) = seeded(&[
            ("b/2.txt", b""),
            ("a/z/1.txt", b""),
            ("a/y.txt", b""),
            ("c.txt", b""),
        ]);

        let names: Vec<String> = collect_recursive(&storage, &root)
            .into_iter()
            .map(|p| p.trim_start_matches(root.as_str()).to_string())
            .collect();

        assert_eq!(names, vec!["/a/y.txt", "/a/z/1.txt", "/b/2.txt", "/c.txt"]);
    }

    #[test]
    fn test_recursive_walk_matches_manual_walk_minus_hidden() {
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();
        for depth in 0..6 {
            let mut dir = String::new();
            for level in 0..depth {
                let segment = if level == 2 { "_tmp".to_string() } else { format!("d{}", level) };
                dir.push_str(&segment);
                dir.push('/');
            }
            files.push((format!("{}f{}.txt", dir, depth), vec![]));
            files.push((format!("{}_marker{}", dir, depth), vec![]));
            files.push((format!("{}sib/g{}.txt", dir, depth), vec![]));
        }
        let layout: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_slice()))
            .collect();
        let (_dir, storage, root) = seeded(&layout);

        // Unfiltered walk, then drop anything under a hidden segment.
        fn manual(storage: &dyn StorageService, path: &ClusterPath, out: &mut Vec<String>) {
            for child in storage.list_children(path).unwrap() {
                if child.is_dir {
                    manual(storage, &child.path, out);
                } else {
                    out.push(child.path.to_string());
                }
            }
        }
        let mut expected = Vec::new();
        manual(&storage, &root, &mut expected);
        expected.retain(|p| {
            !p.trim_start_matches(root.as_str())
                .split('/')
                .any(|segment| segment.starts_with('_'))
        });

        let seen = collect_recursive(&storage, &root);
        assert_eq!(seen, expected);
        assert!(!seen.is_empty());
    }

    #[test]
    fn test_recursive_on_file_root() {
        let (_dir, storage, root) = seeded(&[("plain.txt", b"p"), ("_hidden.txt", b"h")]);

        assert_eq!(
            collect_recursive(&storage, &root.join("plain.txt")),
            vec![root.join("plain.txt").to_string()]
        );
        assert!(collect_recursive(&storage, &root.join("_hidden.txt")).is_empty());
    }

    #[test]
    fn test_visitor_break_stops_traversal() {
        let (_dir, storage, root) = seeded(&[("1.txt", b""), ("2.txt", b""), ("3.txt", b"")]);
        let mut seen = 0;

        let flow = process_paths_recursive(&storage, &root, |_| {
            seen += 1;
            Ok(if seen == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })
        .unwrap();

        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_visitor_error_is_processing_error() {
        let (_dir, storage, root) = seeded(&[("1.txt", b""), ("2.txt", b"")]);
        let mut seen = 0;

        let err = process_paths(&storage, &root, |_| {
            seen += 1;
            Err(anyhow::anyhow!("visitor gave up"))
        })
        .unwrap_err();

        match err {
            FixtureError::Processing { path, source } => {
                assert_eq!(path.name(), "1.txt");
                assert!(source.to_string().contains("visitor gave up"));
            }
            other => panic!("expected processing error, got {:?}", other),
        }
        assert_eq!(seen, 1);
    }

    // ============================================================
    // LINES
    // ============================================================

    #[test]
    fn test_lines_follow_file_then_listing_order() {
        let (_dir, storage, root) = seeded(&[
            ("part-00001", b"c\nd\n"),
            ("part-00000", b"a\r\nb"),
            ("_SUCCESS", b"marker"),
        ]);

        let mut lines = Vec::new();
        process_data(&storage, &root, |line| {
            lines.push(line.to_string());
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();

        assert_eq!(lines, vec!["a", "b", "c", "d"]);
        assert_eq!(storage.open_readers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_seeded_tree_scenario() {
        let (_dir, storage, root) = seeded(&[
            ("a/b.txt", b"x\ny"),
            ("a/_hidden/c.txt", b"z"),
            ("d.txt", b"w"),
        ]);

        let lines = collect_lines_recursive(&storage, &root);

        assert_eq!(lines, vec!["x", "y", "w"]);
        assert!(!lines.contains(&"z".to_string()));
    }

    #[test]
    fn test_callback_failure_aborts_and_releases_reader() {
        let (_dir, storage, root) = seeded(&[("1.txt", b"a\nb\nc"), ("2.txt", b"d")]);
        let mut lines = Vec::new();

        let err = process_data(&storage, &root, |line| {
            lines.push(line.to_string());
            if line == "b" {
                return Err(anyhow::anyhow!("bad record"));
            }
            Ok(ControlFlow::Continue(()))
        })
        .unwrap_err();

        assert!(matches!(err, FixtureError::Processing { .. }));
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(storage.open_readers.load(Ordering::SeqCst), 0);
        // The second file was never opened.
        let opened: Vec<String> = storage
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("open "))
            .collect();
        assert_eq!(opened, vec!["open /user/tester/data/1.txt"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_fatal() {
        let (_dir, storage, root) = seeded(&[("latin1.txt", b"caf\xe9\nok"), ("z.txt", b"next")]);
        let mut lines = Vec::new();

        process_data(&storage, &root, |line| {
            lines.push(line.to_string());
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();

        assert_eq!(lines, vec!["caf\u{FFFD}", "ok", "next"]);
    }

    #[test]
    fn test_every_line_terminator_splits_lines() {
        let (_dir, storage, root) = seeded(&[("mixed.txt", b"a\rb\r\nc\nd\r\n\ne")]);
        let mut lines = Vec::new();

        process_data(&storage, &root, |line| {
            lines.push(line.to_string());
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();

        assert_eq!(lines, vec!["a", "b", "c", "d", "", "e"]);
    }

    #[test]
    fn test_shallow_data_fails_on_visible_subdirectory() {
        let (_dir, storage, root) = seeded(&[("sub/inner.txt", b"i")]);

        let err = process_data(&storage, &root, |_| Ok(ControlFlow::Continue(()))).unwrap_err();

        match err {
            FixtureError::Processing { source, .. } => {
                assert!(source.to_string().contains("Is a directory"));
            }
            other => panic!("expected processing error, got {:?}", other),
        }
    }

    #[test]
    fn test_line_break_stops_remaining_files() {
        let (_dir, storage, root) = seeded(&[("1.txt", b"a\nb"), ("2.txt", b"c")]);
        let mut lines = Vec::new();

        let flow = process_data_recursive(&storage, &root, |line| {
            lines.push(line.to_string());
            Ok(ControlFlow::Break(()))
        })
        .unwrap();

        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(lines, vec!["a"]);
    }
}
