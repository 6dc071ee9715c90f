use std::{io::ErrorKind, path::Path};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};

/// Reads a whole file under a shared lock. A missing file is `None`.
pub async fn read_locked(path: &Path) -> Result<Option<String>, std::io::Error> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    file.lock_shared()?;
    let mut content = String::new();
    let result = file.read_to_string(&mut content).await;
    file.unlock_async().await?;
    result?;
    Ok(Some(content))
}

/// Replaces the content of a file under an exclusive lock, creating it if needed.
pub async fn overwrite_locked(path: &Path, content: &[u8]) -> Result<(), std::io::Error> {
    let mut file = File::options()
        .write(true)
        .create(true)
        .read(true)
        .truncate(false)
        .open(path)
        .await?;

    // Truncation happens after the lock is held so a concurrent reader never sees an empty file.
    file.lock_exclusive()?;
    let result = overwrite_with_file(&mut file, content).await;
    file.unlock_async().await?;
    result
}

async fn overwrite_with_file(file: &mut File, content: &[u8]) -> Result<(), std::io::Error> {
    file.set_len(0).await?;
    file.rewind().await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::{overwrite_locked, read_locked};

    #[tokio::test]
    async fn test_read_missing_file() -> Result<()> {
        let dir = tempdir()?;
        assert_eq!(read_locked(&dir.path().join("absent")).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_replaces_longer_content() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("document");

        overwrite_locked(&path, b"a much longer first version").await?;
        overwrite_locked(&path, b"short").await?;

        assert_eq!(read_locked(&path).await?.as_deref(), Some("short"));
        Ok(())
    }
}
