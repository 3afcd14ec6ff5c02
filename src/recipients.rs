//! Recipient ingestion: decodes an uploaded table and validates its rows.

use std::borrow::Cow;

use encoding_rs::{UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CampaignError;

/// Header of the column holding the display name.
pub const NAME_COLUMN: &str = "name";
/// Header of the column holding the destination phone.
pub const PHONE_COLUMN: &str = "phone";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A validated campaign target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub phone: String,
    pub name: String,
}

impl Recipient {
    /// Build a recipient from raw cell values.
    ///
    /// Both values are trimmed and an empty name becomes a single space.
    /// Returns `None` when the phone is empty.
    pub fn from_fields(name: &str, phone: &str) -> Option<Self> {
        let name = match name.trim() {
            "" => " ",
            trimmed => trimmed,
        };
        let phone = phone.trim();

        if name.is_empty() || phone.is_empty() {
            return None;
        }

        Some(Self {
            phone: phone.to_string(),
            name: name.to_string(),
        })
    }
}

/// Which decoding tier produced the table text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    Latin1,
}

/// Decode raw table bytes.
///
/// Tries strict UTF-8, then UTF-8 with a leading byte-order mark stripped,
/// then a single-byte Latin-1 compatible decoding that accepts any input.
/// A leading byte-order mark never reaches the decoded text.
pub fn decode_table(bytes: &[u8]) -> (Cow<'_, str>, TextEncoding) {
    if !bytes.starts_with(UTF8_BOM) {
        if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
            return (text, TextEncoding::Utf8);
        }
    }

    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(rest) {
            return (text, TextEncoding::Utf8Bom);
        }
    }

    // windows-1252 maps every byte, so this tier cannot fail.
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(body);
    (text, TextEncoding::Latin1)
}

/// Parse an uploaded CSV table into an ordered recipient list.
///
/// Fails with [`CampaignError::Schema`] when the header lacks a required
/// column and with [`CampaignError::NoValidRecipients`] when no row survives
/// validation. Invalid or malformed rows are skipped and only logged.
pub fn parse_recipients(bytes: &[u8]) -> Result<Vec<Recipient>, CampaignError> {
    let (text, encoding) = decode_table(bytes);
    debug!(?encoding, bytes = bytes.len(), "Decoded recipient table");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            warn!(error = %e, "Could not read CSV header row");
            return Err(CampaignError::NoValidRecipients);
        }
    };

    if headers.is_empty() {
        return Err(CampaignError::NoValidRecipients);
    }

    let name_idx = column_index(&headers, NAME_COLUMN)?;
    let phone_idx = column_index(&headers, PHONE_COLUMN)?;

    let mut recipients = Vec::new();
    let mut skipped = 0usize;

    for (offset, result) in reader.records().enumerate() {
        // Line 1 is the header.
        let row = offset + 2;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row, error = %e, "Skipping malformed row");
                skipped += 1;
                continue;
            }
        };

        let name = record.get(name_idx).unwrap_or_default();
        let phone = record.get(phone_idx).unwrap_or_default();

        match Recipient::from_fields(name, phone) {
            Some(recipient) => recipients.push(recipient),
            None => {
                debug!(row, "Skipping row: missing name or phone");
                skipped += 1;
            }
        }
    }

    if recipients.is_empty() {
        return Err(CampaignError::NoValidRecipients);
    }

    info!(
        recipients = recipients.len(),
        skipped,
        ?encoding,
        "Parsed recipient table"
    );

    Ok(recipients)
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, CampaignError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| CampaignError::Schema {
            column: column.to_string(),
        })
}
