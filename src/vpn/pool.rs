//! Shuffled, endlessly cycling pool of VPN endpoints

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use super::endpoint::{parse_remote_line, Endpoint};
use crate::error::{CollectorError, Result};

/// Extension of the files scanned for `remote` directives
pub const CONFIG_EXTENSION: &str = "ovpn";

/// Round-robin cursor over a fixed, shuffled endpoint list
///
/// The order is randomized once on load; after the last endpoint the cursor
/// wraps to the first one of the same order.
#[derive(Debug, Default)]
pub struct ServerPool {
    endpoints: Option<Vec<Endpoint>>,
    index: AtomicUsize,
}

impl ServerPool {
    /// An empty pool; `next` fails until `load` succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool over `endpoints` in the given order, without shuffling
    pub fn from_ordered(endpoints: Vec<Endpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(CollectorError::NoRemotesFound {
                dir: PathBuf::new(),
            });
        }
        Ok(Self {
            endpoints: Some(endpoints),
            index: AtomicUsize::new(0),
        })
    }

    /// Scan `dir` and shuffle with the thread-local RNG
    pub fn load(&mut self, dir: &Path) -> Result<usize> {
        self.load_with_rng(dir, &mut rand::thread_rng())
    }

    /// Scan `dir` and shuffle with the given RNG
    pub fn load_with_rng<R: Rng + ?Sized>(&mut self, dir: &Path, rng: &mut R) -> Result<usize> {
        let files = config_files(dir)?;
        if files.is_empty() {
            return Err(CollectorError::NoConfigFiles {
                dir: dir.to_path_buf(),
            });
        }

        let mut endpoints = Vec::new();
        for path in &files {
            let found = read_remotes(path)?;
            debug!(file = %path.display(), remotes = found.len(), "Parsed VPN config");
            endpoints.extend(found);
        }

        if endpoints.is_empty() {
            return Err(CollectorError::NoRemotesFound {
                dir: dir.to_path_buf(),
            });
        }

        endpoints.shuffle(rng);
        let count = endpoints.len();

        self.endpoints = Some(endpoints);
        self.index.store(0, Ordering::Relaxed);

        info!(
            servers = count,
            files = files.len(),
            dir = %dir.display(),
            "VPN servers loaded"
        );
        Ok(count)
    }

    /// Next endpoint in cyclic order
    pub fn next(&self) -> Result<Endpoint> {
        let endpoints = self
            .endpoints
            .as_ref()
            .ok_or(CollectorError::PoolNotLoaded)?;

        let idx = self.index.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        endpoints
            .get(idx)
            .cloned()
            .ok_or(CollectorError::PoolNotLoaded)
    }

    pub fn len(&self) -> usize {
        self.endpoints.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loaded endpoints in cycle order
    pub fn endpoints(&self) -> &[Endpoint] {
        self.endpoints.as_deref().unwrap_or_default()
    }
}

/// Config files directly inside `dir`, sorted by name so a seeded shuffle is reproducible
fn config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_config = path
            .extension()
            .is_some_and(|ext| ext == CONFIG_EXTENSION);
        if is_config && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_remotes(path: &Path) -> Result<Vec<Endpoint>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut endpoints = Vec::new();
    for line in reader.lines() {
        if let Some((host, port)) = parse_remote_line(&line?) {
            endpoints.push(Endpoint::new(path, host, port));
        }
    }
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_next_before_load() {
        let pool = ServerPool::new();
        assert!(matches!(pool.next(), Err(CollectorError::PoolNotLoaded)));
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_load_missing_config_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", "remote 1.2.3.4 1194\n");
        fs::create_dir(dir.path().join("nested.ovpn")).unwrap();

        let mut pool = ServerPool::new();
        let err = pool.load(dir.path()).unwrap_err();
        assert!(matches!(err, CollectorError::NoConfigFiles { .. }));
    }

    #[test]
    fn test_load_without_remotes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ovpn", "client\ndev tun\nauth-user-pass\n");
        write(dir.path(), "b.ovpn", "client\nremote-random\n");

        let mut pool = ServerPool::new();
        let err = pool.load(dir.path()).unwrap_err();
        assert!(matches!(err, CollectorError::NoRemotesFound { .. }));
    }

    #[test]
    fn test_load_missing_directory() {
        let mut pool = ServerPool::new();
        let err = pool.load(Path::new("/nonexistent/vpn/dir")).unwrap_err();
        assert!(matches!(err, CollectorError::Io(_)));
    }

    #[test]
    fn test_load_collects_all_remotes() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(
            dir.path(),
            "a.ovpn",
            "client\nremote 1.1.1.1 1194\nremote 1.1.1.2 443\nauth-user-pass\n",
        );
        let b = write(dir.path(), "b.ovpn", "  remote 2.2.2.2 1194 udp\n");

        let mut pool = ServerPool::new();
        assert_eq!(pool.load(dir.path()).unwrap(), 3);

        let loaded: HashSet<Endpoint> = pool.endpoints().iter().cloned().collect();
        let expected: HashSet<Endpoint> = [
            Endpoint::new(&a, "1.1.1.1", 1194),
            Endpoint::new(&a, "1.1.1.2", 443),
            Endpoint::new(&b, "2.2.2.2", 1194),
        ]
        .into_iter()
        .collect();
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let lines: String = (1..=20).map(|i| format!("remote 10.0.0.{} 1194\n", i)).collect();
        write(dir.path(), "many.ovpn", &lines);

        let mut first = ServerPool::new();
        first
            .load_with_rng(dir.path(), &mut StdRng::seed_from_u64(7))
            .unwrap();
        let mut second = ServerPool::new();
        second
            .load_with_rng(dir.path(), &mut StdRng::seed_from_u64(7))
            .unwrap();

        assert_eq!(first.endpoints(), second.endpoints());
        assert_eq!(first.len(), 20);
    }

    #[test]
    fn test_cycle_wraps_to_same_order() {
        let dir = tempfile::tempdir().unwrap();
        let lines: String = (1..=5).map(|i| format!("remote 10.0.0.{} 1194\n", i)).collect();
        write(dir.path(), "five.ovpn", &lines);

        let mut pool = ServerPool::new();
        let size = pool
            .load_with_rng(dir.path(), &mut StdRng::seed_from_u64(42))
            .unwrap();

        let first_pass: Vec<Endpoint> = (0..size).map(|_| pool.next().unwrap()).collect();
        for i in 0..size * 2 {
            assert_eq!(pool.next().unwrap(), first_pass[i % size]);
        }
    }

    #[test]
    fn test_two_endpoint_rotation() {
        let a = Endpoint::new("cfgA.ovpn", "1.2.3.4", 1194);
        let b = Endpoint::new("cfgB.ovpn", "5.6.7.8", 1194);
        let pool = ServerPool::from_ordered(vec![b.clone(), a.clone()]).unwrap();

        assert_eq!(pool.next().unwrap(), b);
        assert_eq!(pool.next().unwrap(), a);
        assert_eq!(pool.next().unwrap(), b);
    }

    #[test]
    fn test_from_ordered_rejects_empty() {
        assert!(matches!(
            ServerPool::from_ordered(Vec::new()),
            Err(CollectorError::NoRemotesFound { .. })
        ));
    }
}
