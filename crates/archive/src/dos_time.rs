//! MS-DOS date/time encoding used by ZIP headers.

use time::macros::datetime;
use time::{OffsetDateTime, UtcOffset};

const MIN_YEAR: i32 = 1980;
const MAX_YEAR: i32 = 2107;
const EARLIEST: OffsetDateTime = datetime!(1980-01-01 00:00:00 UTC);
const LATEST: OffsetDateTime = datetime!(2107-12-31 23:59:58 UTC);

/// Encode a timestamp as `(date << 16) | time` in DOS format, in UTC.
///
/// DOS time has two-second resolution. Timestamps outside 1980..=2107 are
/// clamped to the representable range.
pub fn dos_timestamp(at: OffsetDateTime) -> u32 {
    let at = at.to_offset(UtcOffset::UTC);
    let at = if at.year() < MIN_YEAR {
        EARLIEST
    } else if at.year() > MAX_YEAR {
        LATEST
    } else {
        at
    };

    (((at.year() - MIN_YEAR) as u32) << 25)
        | ((u8::from(at.month()) as u32) << 21)
        | ((at.day() as u32) << 16)
        | ((at.hour() as u32) << 11)
        | ((at.minute() as u32) << 5)
        | ((at.second() as u32) >> 1)
}
