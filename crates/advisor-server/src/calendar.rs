//! RFC 5545 `VCALENDAR` serialization for `/calendar/export.ics` — no crate
//! in the workspace's stack covers this, so it is hand-rolled directly
//! against the spec, one `VEVENT` per section meeting with a weekly
//! `RRULE` through the end of the term.

use advisor_core::types::SectionBundle;
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};

const TERM_WEEKS: i64 = 15;

fn weekday_for(day: char) -> Option<Weekday> {
    match day.to_ascii_uppercase() {
        'M' => Some(Weekday::Mon),
        'T' => Some(Weekday::Tue),
        'W' => Some(Weekday::Wed),
        'R' => Some(Weekday::Thu),
        'F' => Some(Weekday::Fri),
        'S' => Some(Weekday::Sat),
        'U' => Some(Weekday::Sun),
        _ => None,
    }
}

fn ical_byday(day: char) -> &'static str {
    match day.to_ascii_uppercase() {
        'M' => "MO",
        'T' => "TU",
        'W' => "WE",
        'R' => "TH",
        'F' => "FR",
        'S' => "SA",
        'U' => "SU",
        _ => "MO",
    }
}

fn next_occurrence_of(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let days_ahead = (weekday.num_days_from_monday() as i64 - today.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    today + Duration::days(days_ahead)
}

fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace(',', "\\,").replace(';', "\\;").replace('\n', "\\n")
}

fn fold_datetime(date: NaiveDate, minutes: u16) -> String {
    let hour = minutes / 60;
    let minute = minutes % 60;
    format!("{}T{hour:02}{minute:02}00", date.format("%Y%m%d"))
}

/// Build a full `VCALENDAR` document covering every meeting across
/// `bundles`, recurring weekly for [`TERM_WEEKS`].
#[must_use]
pub fn build_calendar(student_name: &str, bundles: &[SectionBundle]) -> String {
    let today = Utc::now().date_naive();
    let until = today + Duration::weeks(TERM_WEEKS);
    let until_stamp = format!("{}T235959Z", until.format("%Y%m%d"));
    let now_stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Academic Advisor//Schedule Export//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        format!("X-WR-CALNAME:{} schedule", escape_text(student_name)),
    ];

    for bundle in bundles {
        for (i, meeting) in bundle.meetings.iter().enumerate() {
            let Some(first_day) = meeting.days.first().and_then(|d| weekday_for(*d)) else { continue };
            let start_date = next_occurrence_of(today, first_day);
            let byday: Vec<&str> = meeting.days.iter().map(|d| ical_byday(*d)).collect();

            lines.push("BEGIN:VEVENT".to_string());
            lines.push(format!("UID:{}-{i}@advisor", bundle.bundle_id));
            lines.push(format!("DTSTAMP:{now_stamp}"));
            lines.push(format!("DTSTART:{}", fold_datetime(start_date, meeting.start_min)));
            lines.push(format!("DTEND:{}", fold_datetime(start_date, meeting.end_min)));
            lines.push(format!("RRULE:FREQ=WEEKLY;BYDAY={};UNTIL={until_stamp}", byday.join(",")));
            lines.push(format!("SUMMARY:{}", escape_text(&bundle.course_code)));
            lines.push(format!("DESCRIPTION:{}", escape_text(&format!("Section {}", bundle.bundle_id))));
            lines.push("END:VEVENT".to_string());
        }
    }

    lines.push("END:VCALENDAR".to_string());
    lines.join("\r\n") + "\r\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::types::SectionMeeting;

    #[test]
    fn produces_one_vevent_per_meeting() {
        let bundles = vec![SectionBundle {
            bundle_id: "CS1110-1".to_string(),
            course_code: "CS 1110".to_string(),
            meetings: vec![
                SectionMeeting { days: vec!['M', 'W', 'F'], start_min: 600, end_min: 650 },
                SectionMeeting { days: vec!['T'], start_min: 780, end_min: 840 },
            ],
        }];
        let ics = build_calendar("Ada Lovelace", &bundles);
        assert!(ics.starts_with("BEGIN:VCALENDAR"));
        assert!(ics.trim_end().ends_with("END:VCALENDAR"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.contains("BYDAY=MO,WE,FR"));
        assert!(ics.contains("SUMMARY:CS 1110"));
    }

    #[test]
    fn empty_bundles_yields_bare_calendar() {
        let ics = build_calendar("Nobody", &[]);
        assert!(!ics.contains("BEGIN:VEVENT"));
    }
}
