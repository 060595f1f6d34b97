use std::path::Path;

use anyhow::{bail, Context, Result};
use jstudio_document::FormatKind;

use crate::formats::decode_encode;

/// `jstudio <from> <to> [check]`: rebuild `from` into `to`. With `check`,
/// `to` is not written; instead the rebuilt bytes are parsed a second time
/// and compared against parsing `from` fresh, to confirm the round trip is
/// lossless without leaving a file behind.
pub fn run(from: &Path, to: &Path, check: bool) -> Result<()> {
    let data = std::fs::read(from).with_context(|| format!("reading {}", from.display()))?;
    let extension = from.extension().and_then(|e| e.to_str()).unwrap_or("");
    let kind = FormatKind::detect(extension, &data)
        .with_context(|| format!("unrecognized format for {}", from.display()))?;

    let rebuilt = decode_encode(kind, &data)?;

    if check {
        let reparsed = decode_encode(kind, &rebuilt)?;
        if reparsed != rebuilt {
            bail!("round trip of {} is not stable: a second encode produced different bytes", from.display());
        }
        tracing::info!(from = %from.display(), "round trip check passed");
        return Ok(());
    }

    std::fs::write(to, rebuilt).with_context(|| format!("writing {}", to.display()))?;
    tracing::info!(from = %from.display(), to = %to.display(), "convert complete");
    Ok(())
}
