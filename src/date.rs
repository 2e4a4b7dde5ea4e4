use chrono::NaiveDate;
use thiserror::Error;

/// Why a `mm/dd/yyyy` value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateFormatError {
    #[error("date {text:?} has {found} '/'-separated parts, expected 3 (mm/dd/yyyy)")]
    PartCount { text: String, found: usize },
    #[error("date {text:?} has a non-numeric part")]
    NonNumeric { text: String },
    #[error("date {text:?} is not a calendar date")]
    OutOfRange { text: String },
}

/// Parse an extract date written as `mm/dd/yyyy`, optionally wrapped in quotes.
///
/// Calendar validity is checked: `04/31/2020` or `13/01/1990` are rejected
/// rather than rolled over into the following month or year.
pub fn parse_date(text: &str) -> Result<NaiveDate, DateFormatError> {
    let value = text.trim().trim_matches(|c| c == '"' || c == '\'').trim();

    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() != 3 {
        return Err(DateFormatError::PartCount {
            text: text.to_string(),
            found: parts.len(),
        });
    }

    let numeric = |part: &str| -> Result<u32, DateFormatError> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DateFormatError::NonNumeric {
                text: text.to_string(),
            });
        }
        // all digits, so the only failure left is overflow
        part.parse::<u32>().map_err(|_| DateFormatError::OutOfRange {
            text: text.to_string(),
        })
    };

    let month = numeric(parts[0])?;
    let day = numeric(parts[1])?;
    let year = numeric(parts[2])?;

    i32::try_from(year)
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, month, day))
        .ok_or_else(|| DateFormatError::OutOfRange {
            text: text.to_string(),
        })
}
