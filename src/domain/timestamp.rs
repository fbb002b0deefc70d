use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// `17.09.2023 09:26:38`, the prefix SvxReflector writes on every line.
const DOTTED_LEN: usize = 19;
const DOTTED: &[BorrowedFormatItem<'static>] =
    format_description!("[day].[month].[year] [hour]:[minute]:[second]");

/// `Fri Nov  3 15:37:18 2023`, the ctime-style prefix of SvxLink logs. The weekday is
/// skipped before parsing.
const CTIME_LEN: usize = 24;
const CTIME_WEEKDAY_LEN: usize = 4;
const CTIME: &[BorrowedFormatItem<'static>] = format_description!(
    "[month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
);

const DISPLAY_DATE: &[BorrowedFormatItem<'static>] = format_description!("[day]-[month]-[year]");
const DISPLAY_TIME: &[BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second]");

/// A log timestamp, kept both as epoch millis (for delays) and as display strings.
///
/// Log timestamps carry no zone; they are read as UTC so that epoch arithmetic is stable
/// and the display strings echo the log verbatim.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventTime {
    pub epoch_ms: i64,
    pub date: String,
    pub time: String,
}

impl EventTime {
    fn from_datetime(datetime: PrimitiveDateTime) -> Option<Self> {
        let utc = datetime.assume_utc();
        let epoch_ms = i64::try_from(utc.unix_timestamp_nanos() / 1_000_000).ok()?;
        Some(Self {
            epoch_ms,
            date: datetime.format(DISPLAY_DATE).ok()?,
            time: datetime.format(DISPLAY_TIME).ok()?,
        })
    }
}

pub fn parse_dotted_timestamp(line: &str) -> Option<EventTime> {
    let prefix = line.get(..DOTTED_LEN)?;
    let datetime = PrimitiveDateTime::parse(prefix, DOTTED).ok()?;
    EventTime::from_datetime(datetime)
}

pub fn parse_ctime_timestamp(line: &str) -> Option<EventTime> {
    let prefix = line.get(CTIME_WEEKDAY_LEN..CTIME_LEN)?;
    let datetime = PrimitiveDateTime::parse(prefix, CTIME).ok()?;
    EventTime::from_datetime(datetime)
}

/// Reads whichever timestamp prefix the line carries. `None` means "timestamp absent":
/// callers leave timing fields untouched.
pub fn parse_line_timestamp(line: &str) -> Option<EventTime> {
    parse_dotted_timestamp(line).or_else(|| parse_ctime_timestamp(line))
}
