use crate::dedup::validate_item_id;
use crate::traits::DedupStore;
use crate::types::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Append-only file with one notified item ID per line.
///
/// Each record is a single `id\n` append followed by `sync_data`, so a reader
/// sees either the whole line or an unterminated tail, which [`parse_ids`]
/// ignores. A failed append is cut back off the file, and an append never
/// lands on the same line as a tail left behind by someone else.
pub struct FileDedupStore {
    path: PathBuf,
    seen: RwLock<HashSet<String>>,
    file: Mutex<File>,
}

/// IDs from complete lines only, byte for byte. Blank lines and an
/// unterminated trailing fragment are skipped.
pub fn parse_ids(contents: &str) -> impl Iterator<Item = &str> {
    let complete = match contents.rfind('\n') {
        Some(last) => &contents[..=last],
        None => "",
    };
    complete.lines().filter(|line| !line.trim().is_empty())
}

async fn ends_with_newline(file: &mut File, len: u64) -> Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

async fn append_line(file: &mut File, line: &str) -> Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

impl FileDedupStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let seen: HashSet<String> = parse_ids(&contents).map(str::to_string).collect();

        if !contents.is_empty() && !contents.ends_with('\n') {
            let keep = contents.rfind('\n').map(|i| i + 1).unwrap_or(0);
            warn!(
                "Dedup file {} ends with a partial line; truncating {} bytes",
                path.display(),
                contents.len() - keep
            );
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(keep as u64).await?;
            file.sync_all().await?;
        }

        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!("Loaded {} IDs from {}", seen.len(), path.display());

        Ok(Self {
            path,
            seen: RwLock::new(seen),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn contains(&self, item_id: &str) -> Result<bool> {
        Ok(self.seen.read().await.contains(item_id))
    }

    async fn record(&self, item_id: &str) -> Result<()> {
        validate_item_id(item_id)?;
        if self.contains(item_id).await? {
            return Ok(());
        }

        let mut file = self.file.lock().await;
        // Another writer may have recorded it while we waited for the lock.
        if self.seen.read().await.contains(item_id) {
            return Ok(());
        }

        let len = file.metadata().await?.len();
        let line = if ends_with_newline(&mut file, len).await? {
            format!("{}\n", item_id)
        } else {
            warn!("Dedup file {} has an unterminated last line; starting a new one", self.path.display());
            format!("\n{}\n", item_id)
        };

        if let Err(e) = append_line(&mut file, &line).await {
            if let Err(rollback) = file.set_len(len).await {
                warn!("Could not cut failed append from {}: {}", self.path.display(), rollback);
            }
            return Err(e);
        }

        self.seen.write().await.insert(item_id.to_string());
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.seen.read().await.len())
    }
}
