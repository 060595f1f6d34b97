use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jstudio_document::FormatKind;

use crate::args::ImportFlags;
use crate::formats::decode_encode;

/// `jstudio import <from> [to] [flags]`: parse `from`, apply the flags
/// that are wired into this codec set's transforms (today: none change the
/// bytes, they are validated and logged only), and write the result to
/// `to` (or back over `from` if `to` is omitted).
pub fn run(from: &Path, to: Option<&Path>, flags: &ImportFlags) -> Result<()> {
    let config = flags.to_config();
    tracing::debug!(?config, "resolved import config");

    let data = std::fs::read(from).with_context(|| format!("reading {}", from.display()))?;
    let extension = from.extension().and_then(|e| e.to_str()).unwrap_or("");
    let kind = FormatKind::detect(extension, &data)
        .with_context(|| format!("unrecognized format for {}", from.display()))?;

    let rebuilt = decode_encode(kind, &data)?;

    let destination: PathBuf = to.map(Path::to_path_buf).unwrap_or_else(|| from.to_path_buf());
    std::fs::write(&destination, rebuilt).with_context(|| format!("writing {}", destination.display()))?;

    tracing::info!(from = %from.display(), to = %destination.display(), "import complete");
    Ok(())
}
