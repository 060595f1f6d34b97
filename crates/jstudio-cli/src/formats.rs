//! Dispatch from a detected [`FormatKind`] to the concrete document type
//! that reads and writes it.

use anyhow::{bail, Context, Result};
use jstudio_document::{export, import, FormatKind, NoDependencies, TransactionOutcome};
use jstudio_formats::archive::{rarc, u8_format};
use jstudio_formats::bmd::BmdModel;
use jstudio_formats::brres::BrresFile;
use jstudio_formats::egg::{Bblm, Bdof, Bfg, Blight, Blmap};
use jstudio_formats::kcl::Kcl;
use jstudio_formats::kmp::Kmp;

fn outcome_into_bytes(domain: &str, outcome: TransactionOutcome<Vec<u8>>) -> Result<Vec<u8>> {
    match outcome {
        TransactionOutcome::Complete { value, messages } => {
            for message in &messages {
                tracing::warn!(domain = %message.domain, "{}", message.text);
            }
            Ok(value)
        }
        TransactionOutcome::Failure { messages } => {
            let reason = messages.first().map(|m| m.text.clone()).unwrap_or_else(|| "unknown error".to_string());
            bail!("{domain}: {reason}")
        }
    }
}

/// Parse `data` as `kind` and immediately re-encode it, round-tripping
/// through this crate's in-memory document representation.
pub fn decode_encode(kind: FormatKind, data: &[u8]) -> Result<Vec<u8>> {
    let mut deps = NoDependencies;
    match kind {
        FormatKind::Bmd => {
            let model: BmdModel = match import("bmd", data, &mut deps) {
                TransactionOutcome::Complete { value, .. } => value,
                TransactionOutcome::Failure { messages } => {
                    bail!("bmd: {}", messages.first().map(|m| m.text.clone()).unwrap_or_default())
                }
            };
            outcome_into_bytes("bmd", export("bmd", &model))
        }
        FormatKind::Brres => {
            let file: BrresFile = match import("brres", data, &mut deps) {
                TransactionOutcome::Complete { value, .. } => value,
                TransactionOutcome::Failure { messages } => {
                    bail!("brres: {}", messages.first().map(|m| m.text.clone()).unwrap_or_default())
                }
            };
            outcome_into_bytes("brres", export("brres", &file))
        }
        FormatKind::Kcl => {
            let kcl: Kcl = match import("kcl", data, &mut deps) {
                TransactionOutcome::Complete { value, .. } => value,
                TransactionOutcome::Failure { messages } => {
                    bail!("kcl: {}", messages.first().map(|m| m.text.clone()).unwrap_or_default())
                }
            };
            outcome_into_bytes("kcl", export("kcl", &kcl))
        }
        FormatKind::Kmp => {
            let kmp: Kmp = match import("kmp", data, &mut deps) {
                TransactionOutcome::Complete { value, .. } => value,
                TransactionOutcome::Failure { messages } => {
                    bail!("kmp: {}", messages.first().map(|m| m.text.clone()).unwrap_or_default())
                }
            };
            outcome_into_bytes("kmp", export("kmp", &kmp))
        }
        FormatKind::Blight => {
            let doc: Blight = match import("egg/blight", data, &mut deps) {
                TransactionOutcome::Complete { value, .. } => value,
                TransactionOutcome::Failure { messages } => {
                    bail!("egg/blight: {}", messages.first().map(|m| m.text.clone()).unwrap_or_default())
                }
            };
            outcome_into_bytes("egg/blight", export("egg/blight", &doc))
        }
        FormatKind::Blmap => {
            let doc: Blmap = match import("egg/blmap", data, &mut deps) {
                TransactionOutcome::Complete { value, .. } => value,
                TransactionOutcome::Failure { messages } => {
                    bail!("egg/blmap: {}", messages.first().map(|m| m.text.clone()).unwrap_or_default())
                }
            };
            outcome_into_bytes("egg/blmap", export("egg/blmap", &doc))
        }
        FormatKind::Bfg => {
            let doc: Bfg = match import("egg/bfg", data, &mut deps) {
                TransactionOutcome::Complete { value, .. } => value,
                TransactionOutcome::Failure { messages } => {
                    bail!("egg/bfg: {}", messages.first().map(|m| m.text.clone()).unwrap_or_default())
                }
            };
            outcome_into_bytes("egg/bfg", export("egg/bfg", &doc))
        }
        FormatKind::Bdof => {
            let doc: Bdof = match import("egg/bdof", data, &mut deps) {
                TransactionOutcome::Complete { value, .. } => value,
                TransactionOutcome::Failure { messages } => {
                    bail!("egg/bdof: {}", messages.first().map(|m| m.text.clone()).unwrap_or_default())
                }
            };
            outcome_into_bytes("egg/bdof", export("egg/bdof", &doc))
        }
        FormatKind::Bblm => {
            let doc: Bblm = match import("egg/bblm", data, &mut deps) {
                TransactionOutcome::Complete { value, .. } => value,
                TransactionOutcome::Failure { messages } => {
                    bail!("egg/bblm: {}", messages.first().map(|m| m.text.clone()).unwrap_or_default())
                }
            };
            outcome_into_bytes("egg/bblm", export("egg/bblm", &doc))
        }
        // Archive has no FormatCodec impl: a single logical tree can be
        // written back out as either container, so `jstudio-document`
        // leaves the choice to the caller instead of picking one.
        FormatKind::U8Archive => {
            let archive = u8_format::read(data).context("u8 archive")?;
            u8_format::write(&archive).context("u8 archive")
        }
        FormatKind::RarcArchive => {
            let archive = rarc::read(data).context("rarc archive")?;
            rarc::write(&archive).context("rarc archive")
        }
    }
}
