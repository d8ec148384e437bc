use time::{OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description};

const LOG_TIMESTAMP: &[BorrowedFormatItem<'_>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
);

pub trait Timezone {
    fn to_localtime(&self) -> OffsetDateTime;
    fn to_formatted_string(&self) -> String;
}

impl Timezone for OffsetDateTime {
    fn to_localtime(&self) -> OffsetDateTime {
        // `UtcOffset::current_local_offset` refuses to work in multi-threaded
        // processes, chrono has no such restriction
        // https://github.com/time-rs/time/discussions/421
        let tz_offset_sec = chrono::Local::now().offset().local_minus_utc();
        match UtcOffset::from_whole_seconds(tz_offset_sec) {
            Ok(offset) => self.to_offset(offset),
            Err(_) => *self,
        }
    }

    fn to_formatted_string(&self) -> String {
        self.format(LOG_TIMESTAMP)
            .unwrap_or_else(|_| self.unix_timestamp().to_string())
    }
}
