use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::warn;
use whodunit_protocol::LeaderboardEntry;

/// Flat-file high-score list. The whole list is rewritten on every append,
/// which is plenty at party scale.
pub struct Leaderboard {
    path: PathBuf,
    entries: Mutex<Vec<LeaderboardEntry>>,
}

impl Leaderboard {
    /// Opens the store. A missing file means an empty list; a corrupt file is
    /// logged and treated as empty rather than keeping the server down.
    pub fn open(path: PathBuf) -> io::Result<Leaderboard> {
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(list) => list,
                Err(e) => {
                    warn!("[LEADERBOARD] ignoring corrupt {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(Leaderboard {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn append(&self, entry: LeaderboardEntry) -> io::Result<()> {
        let mut entries = self.entries.lock();
        entries.push(entry);
        let json = serde_json::to_string_pretty(&*entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, json)
    }

    /// Top `n` entries by score, ties broken by earlier timestamp. `n` is
    /// clamped to [1, 100].
    pub fn top_n(&self, n: usize) -> Vec<LeaderboardEntry> {
        let n = n.clamp(1, 100);
        let mut entries = self.entries.lock().clone();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        entries.truncate(n);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(name: &str, score: u32, timestamp: &str) -> LeaderboardEntry {
        LeaderboardEntry {
            name: name.to_string(),
            score,
            timestamp: timestamp.to_string(),
        }
    }

    #[test]
    fn test_append_and_rank() {
        let dir = tempdir().unwrap();
        let store = Leaderboard::open(dir.path().join("scores.json")).unwrap();

        store.append(entry("Maya", 200, "2024-01-01T00:00:00Z")).unwrap();
        store.append(entry("Iris", 450, "2024-01-01T00:01:00Z")).unwrap();
        store.append(entry("Theo", 450, "2024-01-01T00:00:30Z")).unwrap();

        let top = store.top_n(2);
        assert_eq!(top.len(), 2);
        // Equal scores rank by earlier timestamp.
        assert_eq!(top[0].name, "Theo");
        assert_eq!(top[1].name, "Iris");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = Leaderboard::open(dir.path().join("nope.json")).unwrap();
        assert!(store.top_n(10).is_empty());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scores.json");
        fs::write(&path, "{not json").unwrap();
        let store = Leaderboard::open(path).unwrap();
        assert!(store.top_n(10).is_empty());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scores.json");
        {
            let store = Leaderboard::open(path.clone()).unwrap();
            store.append(entry("Maya", 300, "2024-01-01T00:00:00Z")).unwrap();
        }
        let store = Leaderboard::open(path).unwrap();
        let top = store.top_n(10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "Maya");
        assert_eq!(top[0].score, 300);
    }

    #[test]
    fn test_top_n_is_clamped() {
        let dir = tempdir().unwrap();
        let store = Leaderboard::open(dir.path().join("scores.json")).unwrap();
        store.append(entry("Maya", 100, "2024-01-01T00:00:00Z")).unwrap();
        store.append(entry("Iris", 200, "2024-01-01T00:00:01Z")).unwrap();
        assert_eq!(store.top_n(0).len(), 1);
        assert_eq!(store.top_n(5000).len(), 2);
    }
}
