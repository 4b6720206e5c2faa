use crate::error::{AppError, AppResult};

/// `HH:MM:SS` to whole seconds. Minutes and seconds past 59 are not
/// rejected, they just add up.
pub fn parse_seek_offset(text: &str) -> AppResult<u64> {
    let malformed = || AppError::MalformedTimestamp(text.to_string());

    let fields = text
        .split(':')
        .map(|f| {
            let f = f.trim();
            // digits only: `u64::from_str` would also take a leading '+'
            if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            f.parse::<u64>().map_err(|_| malformed())
        })
        .collect::<AppResult<Vec<_>>>()?;

    let [h, m, s] = fields.as_slice() else {
        return Err(malformed());
    };
    h.checked_mul(3600)
        .and_then(|total| total.checked_add(m.checked_mul(60)?))
        .and_then(|total| total.checked_add(*s))
        .ok_or_else(malformed)
}

pub fn format_seek_offset(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
