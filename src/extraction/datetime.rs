//! Date, time and calendar event recognition.
//!
//! A date "core" (ISO, numeric or written month) is found first, then the
//! text right after it decides what the span becomes: a time range or a
//! second date turns it into a calendar event, anything else is a plain date
//! with an optional time, zone and duration.

use regex::{Captures, Regex};
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use super::patterns::{compile, is_alnum_at};
use super::{Candidate, ExtractedEntity, Priority};
use crate::error::ConfigurationError;

const MONTH: &str = r"(?i:(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec))\b\.?";
const MERIDIEM: &str = r"[AaPp]\.?[Mm]\.?";

/// Known zone abbreviations and their UTC offsets in minutes
const ZONES: &[(&str, i32)] = &[
    ("Z", 0),
    ("UTC", 0),
    ("GMT", 0),
    ("EST", -300),
    ("EDT", -240),
    ("CST", -360),
    ("CDT", -300),
    ("MST", -420),
    ("MDT", -360),
    ("PST", -480),
    ("PDT", -420),
    ("AKST", -540),
    ("AKDT", -480),
    ("HST", -600),
    ("BST", 60),
    ("CET", 60),
    ("CEST", 120),
    ("EET", 120),
    ("EEST", 180),
    ("IST", 330),
    ("JST", 540),
    ("KST", 540),
    ("AEST", 600),
    ("AEDT", 660),
];

#[derive(Debug, Clone, Copy)]
struct DateCore {
    start: usize,
    end: usize,
    date: Date,
}

pub(crate) struct DateRecognizer {
    month_first: bool,
    iso: Regex,
    numeric: Regex,
    month_day: Regex,
    day_month: Regex,
    time: Regex,
    zone: Regex,
    duration: Regex,
    time_range: Regex,
    range_separator: Regex,
    all_day: Regex,
}

impl DateRecognizer {
    pub(crate) fn new(month_first: bool) -> Result<Self, ConfigurationError> {
        let zone_names: Vec<&str> = ZONES.iter().map(|(name, _)| *name).collect();
        Ok(Self {
            month_first,
            iso: compile("date", r"\b(\d{4})-(\d{2})-(\d{2})")?,
            numeric: compile("date", r"\b(\d{1,2})[/.](\d{1,2})[/.](\d{4})\b")?,
            month_day: compile(
                "date",
                &format!(r"\b{MONTH}\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"),
            )?,
            day_month: compile(
                "date",
                &format!(r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+{MONTH},?\s+(\d{{4}})\b"),
            )?,
            time: compile(
                "time",
                &format!(r"^(?:T|\s*(?:(?i:at)\s+|@\s*|,\s*)?)(\d{{1,2}})(?::(\d{{2}}))?(?::(\d{{2}}))?(?:\s*({MERIDIEM}))?"),
            )?,
            zone: compile(
                "time zone",
                &format!(r"^\s*({}|[+-]\d{{2}}:?\d{{2}})", zone_names.join("|")),
            )?,
            duration: compile(
                "duration",
                r"^\s+(?i:for)\s+(\d+(?:\.\d+)?)\s*(?i:(hours?|hrs?|h|minutes?|mins?))\b",
            )?,
            time_range: compile(
                "time range",
                &format!(
                    r"^\s*,?\s*(?:(?i:from)\s+)?(\d{{1,2}})(?::(\d{{2}}))?(?:\s*({MERIDIEM}))?\s*(?:-|–|(?i:to|until))\s*(\d{{1,2}})(?::(\d{{2}}))?(?:\s*({MERIDIEM}))?"
                ),
            )?,
            range_separator: compile("date range", r"^\s*(?:-|–|(?i:to|through|until))\s*")?,
            all_day: compile("all day", r"^\s*\(?(?i:all[- ]day)\)?")?,
        })
    }

    pub(crate) fn scan(&self, text: &str, out: &mut Vec<Candidate>) {
        let cores = self.find_cores(text);

        for core in &cores {
            let rest = &text[core.end..];

            if let Some(event) = self.time_range_event(core, rest) {
                out.push(event);
                continue;
            }

            if let Some(separator) = self.range_separator.find(rest) {
                let next_start = core.end + separator.end();
                if let Some(next) = cores.iter().find(|c| c.start == next_start) {
                    out.push(Candidate::new(
                        core.start,
                        next.end,
                        Priority::CalendarEvent,
                        ExtractedEntity::CalendarEvent {
                            all_day: true,
                            start: Some(midnight(core.date)),
                            end: Some(midnight(next.date)),
                        },
                    ));
                    continue;
                }
            }

            if let Some(all_day) = self.all_day.find(rest) {
                let start = midnight(core.date);
                out.push(Candidate::new(
                    core.start,
                    core.end + all_day.end(),
                    Priority::CalendarEvent,
                    ExtractedEntity::CalendarEvent {
                        all_day: true,
                        start: Some(start),
                        end: start.checked_add(Duration::days(1)),
                    },
                ));
                continue;
            }

            out.push(self.date_entity(core, text));
        }
    }

    fn find_cores(&self, text: &str) -> Vec<DateCore> {
        let mut cores = Vec::new();

        for caps in self.iso.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            // 2025-10-081 is not a date
            if text[whole.end()..].starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }
            if let Some(date) = ymd(num(&caps, 1), num(&caps, 2), num(&caps, 3)) {
                cores.push(DateCore { start: whole.start(), end: whole.end(), date });
            }
        }

        for caps in self.numeric.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let (a, b) = (num(&caps, 1), num(&caps, 2));
            let (month, day) = if self.month_first { (a, b) } else { (b, a) };
            if let Some(date) = ymd(num(&caps, 3), month, day) {
                cores.push(DateCore { start: whole.start(), end: whole.end(), date });
            }
        }

        for caps in self.month_day.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let month = caps.get(1).and_then(|m| month_number(m.as_str()));
            if let Some(date) = month.and_then(|m| ymd(num(&caps, 3), Some(m), num(&caps, 2))) {
                cores.push(DateCore { start: whole.start(), end: whole.end(), date });
            }
        }

        for caps in self.day_month.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let month = caps.get(2).and_then(|m| month_number(m.as_str()));
            if let Some(date) = month.and_then(|m| ymd(num(&caps, 3), Some(m), num(&caps, 1))) {
                cores.push(DateCore { start: whole.start(), end: whole.end(), date });
            }
        }

        cores.sort_by_key(|c| (c.start, std::cmp::Reverse(c.end)));
        cores.dedup_by_key(|c| c.start);
        cores
    }

    fn time_range_event(&self, core: &DateCore, rest: &str) -> Option<Candidate> {
        let caps = self.time_range.captures(rest)?;
        let whole = caps.get(0)?;
        if is_alnum_at(rest, whole.end()) {
            return None;
        }

        let end_meridiem = caps.get(6).map(|m| m.as_str());
        let start_meridiem = caps.get(3).map(|m| m.as_str()).or(end_meridiem);
        let start_time = parse_time(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()), None, start_meridiem)?;
        let end_time = parse_time(caps.get(4)?.as_str(), caps.get(5).map(|m| m.as_str()), None, end_meridiem)?;

        let start = PrimitiveDateTime::new(core.date, start_time).assume_utc();
        let mut end = Some(PrimitiveDateTime::new(core.date, end_time).assume_utc());
        // Ends before it starts: runs past midnight. None on the last representable day.
        if end.is_some_and(|end| end < start) {
            end = end.and_then(|end| end.checked_add(Duration::days(1)));
        }

        Some(Candidate::new(
            core.start,
            core.end + whole.end(),
            Priority::CalendarEvent,
            ExtractedEntity::CalendarEvent {
                all_day: false,
                start: Some(start),
                end,
            },
        ))
    }

    fn date_entity(&self, core: &DateCore, text: &str) -> Candidate {
        let mut end = core.end;
        let mut time = Time::MIDNIGHT;
        let mut offset = UtcOffset::UTC;
        let mut time_zone = None;
        let mut duration = None;

        if let Some(caps) = self.time.captures(&text[end..]) {
            let whole_end = caps.get(0).map_or(0, |m| m.end());
            let parsed = caps.get(1).and_then(|hour| {
                parse_time(
                    hour.as_str(),
                    caps.get(2).map(|m| m.as_str()),
                    caps.get(3).map(|m| m.as_str()),
                    caps.get(4).map(|m| m.as_str()),
                )
            });
            if let Some(parsed) = parsed.filter(|_| !is_alnum_at(text, end + whole_end)) {
                time = parsed;
                end += whole_end;

                if let Some(zone) = self.zone.captures(&text[end..]) {
                    let zone_end = zone.get(0).map_or(0, |m| m.end());
                    let name = zone.get(1).map_or("", |m| m.as_str());
                    if let Some(zone_offset) = zone_offset(name).filter(|_| !is_alnum_at(text, end + zone_end)) {
                        offset = zone_offset;
                        time_zone = Some(name.to_string());
                        end += zone_end;
                    }
                }
            }
        }

        if let Some(caps) = self.duration.captures(&text[end..]) {
            let amount: Option<f64> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let unit = caps.get(2).map_or("", |m| m.as_str()).to_ascii_lowercase();
            if let Some(amount) = amount {
                let seconds = if unit.starts_with('h') { amount * 3600.0 } else { amount * 60.0 };
                duration = Some(seconds);
                end += caps.get(0).map_or(0, |m| m.end());
            }
        }

        Candidate::new(
            core.start,
            end,
            Priority::Date,
            ExtractedEntity::Date {
                timestamp: PrimitiveDateTime::new(core.date, time).assume_offset(offset),
                time_zone,
                duration,
            },
        )
    }
}

fn num(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group).and_then(|m| m.as_str().parse().ok())
}

fn ymd(year: Option<u32>, month: Option<u32>, day: Option<u32>) -> Option<Date> {
    let month = Month::try_from(u8::try_from(month?).ok()?).ok()?;
    Date::from_calendar_date(i32::try_from(year?).ok()?, month, u8::try_from(day?).ok()?).ok()
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let index = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| *m == prefix)?;
    Some(index as u32 + 1)
}

/// A bare hour ("at 3") is not a time; it needs minutes or a meridiem
fn parse_time(hour: &str, minute: Option<&str>, second: Option<&str>, meridiem: Option<&str>) -> Option<Time> {
    if minute.is_none() && meridiem.is_none() {
        return None;
    }
    let mut hour: u8 = hour.parse().ok()?;
    let minute: u8 = minute.map_or(Some(0), |m| m.parse().ok())?;
    let second: u8 = second.map_or(Some(0), |s| s.parse().ok())?;

    if let Some(meridiem) = meridiem {
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = meridiem.starts_with(['p', 'P']);
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }
    Time::from_hms(hour, minute, second).ok()
}

fn zone_offset(name: &str) -> Option<UtcOffset> {
    let minutes = if let Some((_, minutes)) = ZONES.iter().find(|(zone, _)| *zone == name) {
        *minutes
    } else {
        let sign = if name.starts_with('-') { -1 } else { 1 };
        let digits: String = name.chars().filter(char::is_ascii_digit).collect();
        let hours: i32 = digits.get(0..2)?.parse().ok()?;
        let mins: i32 = digits.get(2..4)?.parse().ok()?;
        sign * (hours * 60 + mins)
    };
    let hours = i8::try_from(minutes / 60).ok()?;
    let mins = i8::try_from(minutes % 60).ok()?;
    UtcOffset::from_hms(hours, mins, 0).ok()
}

fn midnight(date: Date) -> OffsetDateTime {
    PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc()
}
