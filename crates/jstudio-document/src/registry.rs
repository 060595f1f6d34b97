//! Format detection and the three-state read transaction / one-pass write
//! transaction every codec goes through.
//!
//! Each format's document type already implements
//! [`jstudio_formats::FormatCodec`]; this module does not re-wrap that
//! trait behind a boxed registry of codecs (the supported format set is
//! closed and small, and every call site already knows which document type
//! it wants), it just supplies the generic transaction shape and the
//! magic/extension sniffing used to pick a type before calling it.

use std::fmt::Display;

use jstudio_formats::FormatCodec;

/// Severity of one message a codec reports during a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

/// One message a codec attaches to a transaction, tagged with the
/// subsystem that raised it (e.g. `"bmd/shp1"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecMessage {
    pub severity: Severity,
    pub domain: String,
    pub text: String,
}

impl CodecMessage {
    pub fn error(domain: impl Into<String>, text: impl Into<String>) -> Self {
        Self { severity: Severity::Error, domain: domain.into(), text: text.into() }
    }

    pub fn warning(domain: impl Into<String>, text: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, domain: domain.into(), text: text.into() }
    }
}

/// Outcome of a read or write transaction.
#[derive(Debug)]
pub enum TransactionOutcome<T> {
    /// The transaction produced `value`; `messages` may still hold
    /// warnings collected along the way.
    Complete { value: T, messages: Vec<CodecMessage> },
    /// The transaction was abandoned; no partial result is returned.
    Failure { messages: Vec<CodecMessage> },
}

impl<T> TransactionOutcome<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    pub fn messages(&self) -> &[CodecMessage] {
        match self {
            Self::Complete { messages, .. } | Self::Failure { messages } => messages,
        }
    }

    /// The produced value, or `None` on failure.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Complete { value, .. } => Some(value),
            Self::Failure { .. } => None,
        }
    }
}

/// Caller hook for the `ResolveDependencies` state: given the name of a
/// file a codec says it needs (e.g. a companion texture), return its bytes
/// if available. Returning `None` fails the transaction.
pub trait DependencyResolver {
    fn resolve(&mut self, name: &str) -> Option<Vec<u8>>;
}

/// A resolver that has nothing to offer; the default for codecs that never
/// announce missing dependencies (every format in this crate, today).
pub struct NoDependencies;

impl DependencyResolver for NoDependencies {
    fn resolve(&mut self, _name: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Run the three-state read transaction for a [`FormatCodec`] type:
/// `Configure` (no format here requests caller-supplied properties, so this
/// state is always skipped), `ResolveDependencies` (likewise unused today;
/// `deps` is threaded through so a future codec can call back into it), and
/// `Read`. A parse error ends the transaction in `Failure` with the error's
/// `Display` text as a single `Error`-severity message.
pub fn import<T>(domain: &str, data: &[u8], _deps: &mut dyn DependencyResolver) -> TransactionOutcome<T>
where
    T: FormatCodec,
    T::Error: Display,
{
    match T::read(data) {
        Ok(value) => TransactionOutcome::Complete { value, messages: Vec::new() },
        Err(e) => {
            tracing::warn!(domain, error = %e, "import transaction failed");
            TransactionOutcome::Failure { messages: vec![CodecMessage::error(domain, e.to_string())] }
        }
    }
}

/// Run the single-pass write transaction for a [`FormatCodec`] type.
pub fn export<T>(domain: &str, document: &T) -> TransactionOutcome<Vec<u8>>
where
    T: FormatCodec,
    T::Error: Display,
{
    match document.write() {
        Ok(bytes) => TransactionOutcome::Complete { value: bytes, messages: Vec::new() },
        Err(e) => {
            tracing::warn!(domain, error = %e, "export transaction failed");
            TransactionOutcome::Failure { messages: vec![CodecMessage::error(domain, e.to_string())] }
        }
    }
}

/// The format a byte stream or file extension identifies as, used to pick
/// which [`FormatCodec`] type to dispatch to before calling [`import`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Bmd,
    Brres,
    Kcl,
    Kmp,
    U8Archive,
    RarcArchive,
    Blight,
    Blmap,
    Bfg,
    Bdof,
    Bblm,
}

impl FormatKind {
    /// Identify a format from its file extension (no leading dot, matched
    /// case-insensitively) and/or the start of its byte content. Either
    /// argument may be empty; at least one must be enough to decide.
    pub fn detect(extension: &str, data: &[u8]) -> Option<Self> {
        let ext = extension.to_ascii_lowercase();
        match ext.as_str() {
            "bmd" | "bdl" => return Some(Self::Bmd),
            "brres" => return Some(Self::Brres),
            "kcl" => return Some(Self::Kcl),
            "kmp" => return Some(Self::Kmp),
            "arc" | "u8" => return Some(Self::U8Archive),
            "rarc" => return Some(Self::RarcArchive),
            "blight" => return Some(Self::Blight),
            "blmap" => return Some(Self::Blmap),
            "bfg" => return Some(Self::Bfg),
            "bdof" => return Some(Self::Bdof),
            "bblm" => return Some(Self::Bblm),
            _ => {}
        }

        if data.len() < 4 {
            return None;
        }
        match &data[..4] {
            b"J3D2" => Some(Self::Bmd),
            b"bres" => Some(Self::Brres),
            b"RKMD" => Some(Self::Kmp),
            b"RARC" => Some(Self::RarcArchive),
            b"LGHT" => Some(Self::Blight),
            b"LMAP" => Some(Self::Blmap),
            b"bfg1" => Some(Self::Bfg),
            b"bdf1" => Some(Self::Bdof),
            b"blm1" => Some(Self::Bblm),
            _ if data.len() >= 4 && u32::from_be_bytes([data[0], data[1], data[2], data[3]]) == 0x55AA_382D => {
                Some(Self::U8Archive)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jstudio_formats::bmd::BmdModel;

    #[test]
    fn detect_prefers_extension_then_falls_back_to_magic() {
        assert_eq!(FormatKind::detect("bmd", b""), Some(FormatKind::Bmd));
        assert_eq!(FormatKind::detect("", b"bres"), Some(FormatKind::Brres));
        assert_eq!(FormatKind::detect("", b"RKMD"), Some(FormatKind::Kmp));
        assert_eq!(FormatKind::detect("", b"plain"), None);
    }

    #[test]
    fn import_reports_a_failure_message_on_malformed_input() {
        let mut deps = NoDependencies;
        let outcome: TransactionOutcome<BmdModel> = import("bmd", b"not a bmd file at all", &mut deps);
        assert!(!outcome.is_complete());
        assert_eq!(outcome.messages().len(), 1);
        assert_eq!(outcome.messages()[0].severity, Severity::Error);
        assert_eq!(outcome.messages()[0].domain, "bmd");
    }
}
