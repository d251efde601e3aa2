use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, EpisubError};

/// Move an engine's output from its scratch directory to the artifact path.
///
/// The file is copied next to the destination and renamed, so the artifact
/// path either holds the complete transcript or nothing new.
pub async fn install_artifact(produced: &Path, output_path: &Path) -> Result<()> {
    let size = match fs::metadata(produced).await {
        Ok(metadata) => metadata.len(),
        Err(_) => {
            return Err(EpisubError::Transcriber(format!(
                "engine did not produce {}",
                produced.display()
            )));
        }
    };
    if size == 0 {
        return Err(EpisubError::Transcriber(format!(
            "engine produced an empty transcript {}",
            produced.display()
        )));
    }

    let partial = output_path.with_extension("srt.partial");
    fs::copy(produced, &partial).await?;
    fs::rename(&partial, output_path).await?;

    debug!("Installed transcript {} ({} bytes)", output_path.display(), size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[tokio::test]
    async fn test_install_artifact_moves_content() {
        let temp = assert_fs::TempDir::new().unwrap();
        let produced = temp.child("audio.srt");
        produced.write_str("1\n00:00:00,000 --> 00:00:01,000\n你好\n\n").unwrap();
        let output = temp.child("out.srt");

        install_artifact(produced.path(), output.path()).await.unwrap();

        let content = std::fs::read_to_string(output.path()).unwrap();
        assert!(content.contains("你好"));
        assert!(!temp.child("out.srt.partial").path().exists());
    }

    #[tokio::test]
    async fn test_install_artifact_rejects_missing_and_empty() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = temp.child("out.srt");

        let missing = install_artifact(temp.child("nope.srt").path(), output.path()).await;
        assert!(matches!(missing, Err(EpisubError::Transcriber(_))));

        let empty = temp.child("empty.srt");
        empty.touch().unwrap();
        assert!(install_artifact(empty.path(), output.path()).await.is_err());
        assert!(!output.path().exists());
    }
}
