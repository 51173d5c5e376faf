//! Text encoding of access log files
//!
//! Operational exports arrive either as UTF-8 (optionally with a BOM) or in
//! the Korean legacy code page (cp949). The encoding is configuration, never
//! sniffed, and the same encoding is used for reading and exporting.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SourceEncoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    /// UTF-8 with a leading byte order mark (spreadsheet-friendly export)
    #[serde(rename = "utf-8-sig")]
    Utf8Bom,
    /// Korean legacy 8-bit code page (Windows-949 / EUC-KR superset)
    #[serde(rename = "cp949")]
    Cp949,
}

impl SourceEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Utf8Bom => "utf-8-sig",
            SourceEncoding::Cp949 => "cp949",
        }
    }

    /// Decode raw file bytes into text.
    ///
    /// A leading UTF-8 BOM is stripped for both UTF-8 variants. Malformed
    /// input is an error: a wrongly configured encoding must not silently
    /// produce replacement characters in employee ids.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>> {
        let (text, had_errors) = match self {
            SourceEncoding::Utf8 | SourceEncoding::Utf8Bom => {
                encoding_rs::UTF_8.decode_with_bom_removal(bytes)
            }
            SourceEncoding::Cp949 => encoding_rs::EUC_KR.decode_without_bom_handling(bytes),
        };
        if had_errors {
            anyhow::bail!(
                "input is not valid {} text (try a different --encoding)",
                self.as_str()
            );
        }
        Ok(text)
    }

    /// Encode text for export.
    ///
    /// Fails if the text contains characters the target encoding cannot
    /// represent, since export must be lossless for the documented columns.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            SourceEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            SourceEncoding::Utf8Bom => {
                let mut bytes = Vec::with_capacity(UTF8_BOM.len() + text.len());
                bytes.extend_from_slice(UTF8_BOM);
                bytes.extend_from_slice(text.as_bytes());
                Ok(bytes)
            }
            SourceEncoding::Cp949 => {
                let (bytes, _, had_unmappable) = encoding_rs::EUC_KR.encode(text);
                if had_unmappable {
                    anyhow::bail!("export contains characters not representable in cp949");
                }
                Ok(bytes.into_owned())
            }
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(SourceEncoding::Utf8),
            "utf-8-sig" | "utf8-sig" | "utf-8-bom" => Ok(SourceEncoding::Utf8Bom),
            "cp949" | "euc-kr" | "ms949" | "windows-949" => Ok(SourceEncoding::Cp949),
            other => Err(format!(
                "unknown encoding '{}' (expected utf-8, utf-8-sig, or cp949)",
                other
            )),
        }
    }
}
